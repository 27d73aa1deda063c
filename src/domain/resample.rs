//! Timeframe resampling of a base 1-minute bar series.
//!
//! Bars are grouped into non-overlapping windows anchored at the top of the
//! hour and aggregated open=first, high=max, low=min, close=last. Windows with
//! no input bars between the first and last populated window are back-filled
//! from the next populated window, so the output has no gaps.

use chrono::Timelike;

use crate::domain::bar::Bar;
use crate::domain::error::StochtraderError;
use crate::domain::interval::Interval;

/// Fails with `NonTemporalIndex` unless timestamps strictly increase, and
/// with `InconsistentBar` on the first bar whose prices are out of range.
pub fn ensure_well_formed(bars: &[Bar]) -> Result<(), StochtraderError> {
    bars.iter().try_for_each(Bar::validate)?;
    for pair in bars.windows(2) {
        if pair[1].timestamp <= pair[0].timestamp {
            return Err(StochtraderError::NonTemporalIndex {
                timestamp: pair[1].timestamp,
            });
        }
    }
    Ok(())
}

pub fn resample(bars: &[Bar], interval: Interval) -> Result<Vec<Bar>, StochtraderError> {
    ensure_well_formed(bars)?;

    if interval == Interval::NATIVE {
        return Ok(bars
            .iter()
            .map(|b| Bar {
                hour: b.timestamp.hour(),
                ..b.clone()
            })
            .collect());
    }

    let mut populated: Vec<Bar> = Vec::new();
    for bar in bars {
        let window = interval.floor(bar.timestamp);
        match populated.last_mut() {
            Some(agg) if agg.timestamp == window => {
                agg.high = agg.high.max(bar.high);
                agg.low = agg.low.min(bar.low);
                agg.close = bar.close;
            }
            _ => populated.push(Bar::new(window, bar.open, bar.high, bar.low, bar.close)),
        }
    }

    Ok(backfill_gaps(populated, interval))
}

fn backfill_gaps(populated: Vec<Bar>, interval: Interval) -> Vec<Bar> {
    let step = interval.duration();
    let mut out: Vec<Bar> = Vec::with_capacity(populated.len());

    for bar in populated {
        if let Some(prev) = out.last() {
            let mut missing = prev.timestamp + step;
            while missing < bar.timestamp {
                out.push(Bar::new(missing, bar.open, bar.high, bar.low, bar.close));
                missing += step;
            }
        }
        out.push(bar);
    }

    out
}
