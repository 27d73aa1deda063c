//! OHLC bar representation and tick aggregation.

use chrono::{NaiveDateTime, Timelike};

use crate::domain::error::StochtraderError;

#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub hour: u32,
}

impl Bar {
    pub fn new(timestamp: NaiveDateTime, open: f64, high: f64, low: f64, close: f64) -> Self {
        Bar {
            timestamp,
            open,
            high,
            low,
            close,
            hour: timestamp.hour(),
        }
    }

    /// Folds the raw samples of one wall-clock slot into a bar.
    ///
    /// `timestamp` labels the period the samples summarise, not the flush time.
    pub fn from_samples(samples: &[f64], timestamp: NaiveDateTime) -> Result<Self, StochtraderError> {
        let (&first, &last) = match (samples.first(), samples.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(StochtraderError::EmptySampleSet),
        };

        if let Some(&value) = samples.iter().find(|v| !v.is_finite()) {
            return Err(StochtraderError::NonFiniteSample { value });
        }

        let high = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let low = samples.iter().copied().fold(f64::INFINITY, f64::min);

        Ok(Bar::new(timestamp, first, high, low, last))
    }

    /// high >= max(open, close) >= min(open, close) >= low
    pub fn is_consistent(&self) -> bool {
        self.high >= self.open.max(self.close)
            && self.open.min(self.close) >= self.low
            && self.high >= self.low
    }

    pub fn validate(&self) -> Result<(), StochtraderError> {
        if self.is_consistent() {
            Ok(())
        } else {
            Err(StochtraderError::InconsistentBar {
                timestamp: self.timestamp,
            })
        }
    }
}
