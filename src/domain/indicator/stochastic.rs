//! Full stochastic oscillator.
//!
//! K_raw[i] = 100 * (C[i] - LL(P)) / (HH(P) - LL(P))
//! %K = SMA(K_raw, S), %D = SMA(%K, D)
//! Warmup: %K undefined for the first P+S-2 bars, %D for the first P+S+D-3.
//! A flat window (HH == LL) carries the previous K_raw forward, or 50 when
//! there is no previous value yet.

use crate::domain::bar::Bar;
use crate::domain::indicator::sma::rolling_mean;
use crate::domain::indicator::{OscillatorPoint, OscillatorSeries, StochasticParams};

const FLAT_WINDOW_SEED: f64 = 50.0;

pub fn calculate_stochastic(bars: &[Bar], params: StochasticParams) -> OscillatorSeries {
    if params.k_period == 0 || params.smooth == 0 || params.d_period == 0 {
        return OscillatorSeries {
            params,
            values: bars
                .iter()
                .map(|b| OscillatorPoint {
                    timestamp: b.timestamp,
                    k: None,
                    d: None,
                })
                .collect(),
        };
    }

    let raw = raw_k(bars, params.k_period);
    let k = rolling_mean(&raw, params.smooth);
    let d = rolling_mean(&k, params.d_period);

    let values = bars
        .iter()
        .zip(k.into_iter().zip(d))
        .map(|(bar, (k, d))| OscillatorPoint {
            timestamp: bar.timestamp,
            k,
            d,
        })
        .collect();

    OscillatorSeries { params, values }
}

fn raw_k(bars: &[Bar], period: usize) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(bars.len());
    let mut previous: Option<f64> = None;

    for i in 0..bars.len() {
        if i + 1 < period {
            out.push(None);
            continue;
        }

        let window = &bars[i + 1 - period..=i];
        let highest = window.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
        let lowest = window.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
        let range = highest - lowest;

        let value = if range > 0.0 {
            (100.0 * (bars[i].close - lowest) / range).clamp(0.0, 100.0)
        } else {
            previous.unwrap_or(FLAT_WINDOW_SEED)
        };

        previous = Some(value);
        out.push(Some(value));
    }

    out
}
