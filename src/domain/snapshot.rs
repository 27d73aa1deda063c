//! Builds signal inputs from a base bar series at an evaluation instant.
//!
//! Each timeframe's "current" bar is the latest resampled bar whose window
//! has fully closed at the instant, so a bar still being formed never feeds
//! the signal engine. The live loop and the backtest both go through
//! `MarketView::inputs_at`.

use chrono::{NaiveDateTime, Timelike};

use crate::domain::bar::Bar;
use crate::domain::error::StochtraderError;
use crate::domain::indicator::stochastic::calculate_stochastic;
use crate::domain::indicator::{OscillatorSeries, StochasticParams};
use crate::domain::interval::Interval;
use crate::domain::resample::resample;
use crate::domain::signal::{Crossing, SignalInputs};
use crate::domain::strategy::StrategyConfig;

/// One timeframe: resampled bars and their oscillator.
#[derive(Debug, Clone)]
pub struct TimeframeView {
    pub interval: Interval,
    pub bars: Vec<Bar>,
    pub oscillator: OscillatorSeries,
}

impl TimeframeView {
    pub fn build(
        base: &[Bar],
        interval: Interval,
        params: StochasticParams,
    ) -> Result<Self, StochtraderError> {
        let bars = resample(base, interval)?;
        let oscillator = calculate_stochastic(&bars, params);
        Ok(TimeframeView {
            interval,
            bars,
            oscillator,
        })
    }

    /// Index of the latest bar whose window closed at or before `instant`.
    pub fn completed_index(&self, instant: NaiveDateTime) -> Option<usize> {
        let step = self.interval.duration();
        let count = self
            .bars
            .partition_point(|b| b.timestamp + step <= instant);
        count.checked_sub(1)
    }

    pub fn crossing_at(&self, index: usize) -> Option<Crossing> {
        let previous = self.oscillator.values.get(index.checked_sub(1)?)?;
        let current = self.oscillator.values.get(index)?;
        Crossing::from_points(current.k, current.d, previous.k, previous.d)
    }
}

#[derive(Debug, Clone)]
pub struct MarketView {
    pub enter: TimeframeView,
    pub exit: TimeframeView,
}

impl MarketView {
    pub fn build(base: &[Bar], strategy: &StrategyConfig) -> Result<Self, StochtraderError> {
        Ok(MarketView {
            enter: TimeframeView::build(base, strategy.enter_interval, strategy.enter)?,
            exit: TimeframeView::build(base, strategy.exit_interval, strategy.exit)?,
        })
    }

    pub fn inputs_at(&self, strategy: &StrategyConfig, instant: NaiveDateTime) -> SignalInputs {
        let enter_index = self.enter.completed_index(instant);
        let exit_index = self.exit.completed_index(instant);

        let hour = enter_index
            .and_then(|i| self.enter.bars.get(i))
            .map_or(instant.hour(), |b| b.hour);

        SignalInputs {
            enter: enter_index.and_then(|i| self.enter.crossing_at(i)),
            exit: exit_index.and_then(|i| self.exit.crossing_at(i)),
            hour,
            enter_boundary: strategy.enter_interval.is_boundary(instant),
            exit_boundary: strategy.exit_interval.is_boundary(instant),
        }
    }
}

/// Oscillator readings of both timeframes, recorded for plotting.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSnapshot {
    pub timestamp: NaiveDateTime,
    pub asset: String,
    pub enter_k: f64,
    pub enter_d: f64,
    pub exit_k: f64,
    pub exit_d: f64,
}

impl IndicatorSnapshot {
    /// `None` until both oscillators are ready. Values are rounded to 2 decimals.
    pub fn from_inputs(asset: &str, timestamp: NaiveDateTime, inputs: &SignalInputs) -> Option<Self> {
        let enter = inputs.enter?.current;
        let exit = inputs.exit?.current;
        Some(IndicatorSnapshot {
            timestamp,
            asset: asset.to_string(),
            enter_k: round2(enter.k),
            enter_d: round2(enter.d),
            exit_k: round2(exit.k),
            exit_d: round2(exit.d),
        })
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
