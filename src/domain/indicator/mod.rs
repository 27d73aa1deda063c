//! Oscillator types shared by the indicator implementations.
//!
//! - `StochasticParams`: lookback / smoothing / D-period triple
//! - `OscillatorPoint`: one %K/%D observation, `None` while warming up
//! - `OscillatorSeries`: the oscillator computed over a bar series

pub mod sma;
pub mod stochastic;

use chrono::NaiveDateTime;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StochasticParams {
    pub k_period: usize,
    pub smooth: usize,
    pub d_period: usize,
}

impl StochasticParams {
    pub fn new(k_period: usize, smooth: usize, d_period: usize) -> Self {
        StochasticParams {
            k_period,
            smooth,
            d_period,
        }
    }

    /// Bars needed before %K is defined.
    pub fn k_warmup(&self) -> usize {
        self.k_period + self.smooth - 1
    }

    /// Bars needed before %D is defined.
    pub fn d_warmup(&self) -> usize {
        self.k_period + self.smooth + self.d_period - 2
    }
}

impl fmt::Display for StochasticParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "STOCHASTIC({},{},{})",
            self.k_period, self.smooth, self.d_period
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OscillatorPoint {
    pub timestamp: NaiveDateTime,
    pub k: Option<f64>,
    pub d: Option<f64>,
}

impl OscillatorPoint {
    pub fn is_ready(&self) -> bool {
        self.k.is_some() && self.d.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct OscillatorSeries {
    pub params: StochasticParams,
    pub values: Vec<OscillatorPoint>,
}

impl OscillatorSeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn last(&self) -> Option<&OscillatorPoint> {
        self.values.last()
    }
}
