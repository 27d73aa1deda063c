//! Backtest ratios: market/strategy return, drawdown and entry count.

use chrono::{Duration, NaiveDateTime};

use crate::domain::backtest::BacktestSeries;
use crate::domain::error::StochtraderError;
use crate::domain::position::Position;

const MIN_ROWS: usize = 2;

/// Cumulative return curves, both 1.0 at the first row.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnCurves {
    pub timestamps: Vec<NaiveDateTime>,
    pub market: Vec<f64>,
    pub strategy: Vec<f64>,
    pub positions: Vec<Position>,
}

impl ReturnCurves {
    /// Market return is the close pct-change; the strategy earns it with the
    /// previous bar's position, minus `fee` on bars where the position changes.
    pub fn compute(series: &BacktestSeries, fee: f64) -> Result<Self, StochtraderError> {
        let rows = &series.rows;
        if rows.len() < MIN_ROWS {
            return Err(StochtraderError::InsufficientData {
                bars: rows.len(),
                minimum: MIN_ROWS,
            });
        }

        for (i, row) in rows.iter().enumerate() {
            if !row.close.is_finite() || row.close <= 0.0 {
                return Err(StochtraderError::MalformedSeries {
                    reason: format!("close {} at {} is not a positive price", row.close, row.timestamp),
                });
            }
            if i > 0 && row.timestamp <= rows[i - 1].timestamp {
                return Err(StochtraderError::MalformedSeries {
                    reason: format!("timestamp {} is not after its predecessor", row.timestamp),
                });
            }
        }

        let mut positions: Vec<Position> = rows.iter().map(|r| r.position).collect();
        positions[0] = Position::Flat;

        let mut market = Vec::with_capacity(rows.len());
        let mut strategy = Vec::with_capacity(rows.len());
        let mut market_sum = 0.0;
        let mut strategy_sum = 0.0;
        market.push(1.0);
        strategy.push(1.0);

        for i in 1..rows.len() {
            let market_return = rows[i].close / rows[i - 1].close - 1.0;
            let mut strategy_return = market_return * positions[i - 1].as_f64();
            if positions[i] != positions[i - 1] {
                strategy_return -= fee;
            }
            market_sum += market_return;
            strategy_sum += strategy_return;
            market.push(1.0 + market_sum);
            strategy.push(1.0 + strategy_sum);
        }

        Ok(ReturnCurves {
            timestamps: rows.iter().map(|r| r.timestamp).collect(),
            market,
            strategy,
            positions,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    /// Total market return: final cumulative value minus 1.
    pub market_return: f64,
    /// Total strategy return: final cumulative value minus 1.
    pub strategy_return: f64,
    /// Largest peak-to-trough fall of the strategy curve, in curve units.
    pub max_drawdown: f64,
    pub drawdown_start: Option<NaiveDateTime>,
    pub drawdown_end: Option<NaiveDateTime>,
    pub drawdown_period: Duration,
    /// Bars where the position goes from flat to long or short.
    pub transactions: usize,
}

impl Metrics {
    pub fn compute(series: &BacktestSeries, fee: f64) -> Result<Self, StochtraderError> {
        let curves = ReturnCurves::compute(series, fee)?;
        Ok(Self::from_curves(&curves))
    }

    pub fn from_curves(curves: &ReturnCurves) -> Self {
        let (max_drawdown, peak, trough) = compute_drawdown(&curves.strategy);

        let (drawdown_start, drawdown_end, drawdown_period) = if max_drawdown > 0.0 {
            let start = curves.timestamps[peak];
            let end = curves.timestamps[trough];
            (Some(start), Some(end), end - start)
        } else {
            (None, None, Duration::zero())
        };

        let transactions = curves
            .positions
            .windows(2)
            .filter(|w| w[0].is_flat() && !w[1].is_flat())
            .count();

        Metrics {
            market_return: curves.market.last().map_or(0.0, |v| v - 1.0),
            strategy_return: curves.strategy.last().map_or(0.0, |v| v - 1.0),
            max_drawdown,
            drawdown_start,
            drawdown_end,
            drawdown_period,
            transactions,
        }
    }
}

/// Running-max scan. Returns (drawdown, peak index, trough index).
fn compute_drawdown(curve: &[f64]) -> (f64, usize, usize) {
    let Some(&first) = curve.first() else {
        return (0.0, 0, 0);
    };

    let mut peak = first;
    let mut peak_idx = 0usize;
    let mut max_dd = 0.0_f64;
    let mut best = (0usize, 0usize);

    for (i, &value) in curve.iter().enumerate() {
        if value > peak {
            peak = value;
            peak_idx = i;
        }
        let dd = peak - value;
        if dd > max_dd {
            max_dd = dd;
            best = (peak_idx, i);
        }
    }

    (max_dd, best.0, best.1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::backtest::BacktestRow;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn ts(i: usize) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
            + Duration::minutes(i as i64)
    }

    fn make_series(closes: &[f64], positions: &[Position]) -> BacktestSeries {
        BacktestSeries {
            rows: closes
                .iter()
                .zip(positions)
                .enumerate()
                .map(|(i, (&close, &position))| BacktestRow {
                    timestamp: ts(i),
                    close,
                    position,
                })
                .collect(),
        }
    }

    #[test]
    fn curves_start_at_one() {
        let s = make_series(&[100.0, 110.0, 99.0], &[Position::Long; 3]);
        let c = ReturnCurves::compute(&s, 0.0).unwrap();
        assert_eq!(c.market[0], 1.0);
        assert_eq!(c.strategy[0], 1.0);
    }

    #[test]
    fn flat_series_has_flat_strategy_curve() {
        let s = make_series(&[100.0, 105.0, 95.0, 120.0], &[Position::Flat; 4]);
        let c = ReturnCurves::compute(&s, 0.0).unwrap();
        assert!(c.strategy.iter().all(|&v| v == 1.0));

        let m = Metrics::from_curves(&c);
        assert_eq!(m.transactions, 0);
        assert_eq!(m.max_drawdown, 0.0);
        assert_eq!(m.drawdown_period, Duration::zero());
        assert_relative_eq!(m.market_return, 0.05 + (95.0 / 105.0 - 1.0) + (120.0 / 95.0 - 1.0), epsilon = 1e-12);
    }

    #[test]
    fn unchanged_prices_return_zero() {
        let s = make_series(&[100.0; 4], &[Position::Flat, Position::Long, Position::Long, Position::Long]);
        let m = Metrics::compute(&s, 0.0).unwrap();
        assert_eq!(m.market_return, 0.0);
        assert_eq!(m.strategy_return, 0.0);
    }

    #[test]
    fn position_earns_next_bar_return() {
        let s = make_series(
            &[100.0, 110.0, 121.0],
            &[Position::Flat, Position::Long, Position::Long],
        );
        let c = ReturnCurves::compute(&s, 0.0).unwrap();
        assert_relative_eq!(c.strategy[1], 1.0, epsilon = 1e-12);
        assert_relative_eq!(c.strategy[2], 1.1, epsilon = 1e-12);
    }

    #[test]
    fn short_position_inverts_return() {
        let s = make_series(
            &[100.0, 100.0, 90.0],
            &[Position::Flat, Position::Short, Position::Short],
        );
        let m = Metrics::compute(&s, 0.0).unwrap();
        assert_relative_eq!(m.strategy_return, 0.1, epsilon = 1e-12);
        assert_relative_eq!(m.market_return, -0.1, epsilon = 1e-12);
        assert_eq!(m.transactions, 1);
    }

    #[test]
    fn first_row_position_forced_flat() {
        let s = make_series(&[100.0, 50.0], &[Position::Long, Position::Long]);
        let m = Metrics::compute(&s, 0.0).unwrap();
        assert_eq!(m.strategy_return, 0.0);
        assert_eq!(m.transactions, 1);
    }

    #[test]
    fn drawdown_located_by_running_max() {
        // strategy curve: 1.0, 1.0, 1.2, 0.9, 1.0, 0.8
        let closes = [100.0, 100.0, 120.0, 84.0, 92.4, 73.92];
        let s = make_series(&closes, &[Position::Long; 6]);
        let c = ReturnCurves::compute(&s, 0.0).unwrap();
        let expected = [1.0, 1.0, 1.2, 0.9, 1.0, 0.8];
        for (got, want) in c.strategy.iter().zip(expected) {
            assert_relative_eq!(*got, want, epsilon = 1e-9);
        }

        let m = Metrics::from_curves(&c);
        assert_relative_eq!(m.max_drawdown, 0.4, epsilon = 1e-9);
        assert_eq!(m.drawdown_start, Some(ts(2)));
        assert_eq!(m.drawdown_end, Some(ts(5)));
        assert_eq!(m.drawdown_period, Duration::minutes(3));
    }

    #[test]
    fn entries_counted_not_exits() {
        use Position::*;
        let s = make_series(
            &[1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0],
            &[Flat, Long, Flat, Short, Long, Flat, Flat],
        );
        // Flat->Long and Flat->Short count; Short->Long does not
        assert_eq!(Metrics::compute(&s, 0.0).unwrap().transactions, 2);
    }

    #[test]
    fn fee_charged_on_position_change() {
        use Position::*;
        let s = make_series(&[100.0, 100.0, 100.0, 100.0], &[Flat, Long, Long, Flat]);
        let c = ReturnCurves::compute(&s, 0.01).unwrap();
        assert_relative_eq!(c.strategy[1], 0.99, epsilon = 1e-12);
        assert_relative_eq!(c.strategy[2], 0.99, epsilon = 1e-12);
        assert_relative_eq!(c.strategy[3], 0.98, epsilon = 1e-12);
    }

    #[test]
    fn too_few_rows_is_error() {
        let s = make_series(&[100.0], &[Position::Flat]);
        let err = Metrics::compute(&s, 0.0).unwrap_err();
        assert!(matches!(err, StochtraderError::InsufficientData { bars: 1, minimum: 2 }));
        assert!(Metrics::compute(&BacktestSeries::default(), 0.0).is_err());
    }

    #[test]
    fn bad_close_is_malformed() {
        let s = make_series(&[100.0, 0.0], &[Position::Flat; 2]);
        assert!(matches!(
            Metrics::compute(&s, 0.0),
            Err(StochtraderError::MalformedSeries { .. })
        ));
        let s = make_series(&[100.0, f64::NAN], &[Position::Flat; 2]);
        assert!(Metrics::compute(&s, 0.0).is_err());
    }
}
