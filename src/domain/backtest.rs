//! Batch replay of the signal engine over historical bars.
//!
//! Every enter-timeframe bar is evaluated at its close instant with the same
//! inputs the live loop would see, through a fresh `PositionMachine` per run.

use chrono::NaiveDateTime;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::domain::bar::Bar;
use crate::domain::error::StochtraderError;
use crate::domain::interval::Interval;
use crate::domain::position::{Position, PositionMachine, Transaction};
use crate::domain::resample::ensure_well_formed;
use crate::domain::signal::{self, Signal};
use crate::domain::snapshot::MarketView;
use crate::domain::strategy::StrategyConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BacktestRow {
    pub timestamp: NaiveDateTime,
    pub close: f64,
    pub position: Position,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BacktestSeries {
    pub rows: Vec<BacktestRow>,
}

impl BacktestSeries {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct BacktestRun {
    pub asset: String,
    pub series: BacktestSeries,
    pub transactions: Vec<Transaction>,
}

pub fn run_backtest(bars: &[Bar], strategy: &StrategyConfig) -> Result<BacktestRun, StochtraderError> {
    ensure_well_formed(bars)?;
    let view = MarketView::build(bars, strategy)?;
    let step = strategy.enter_interval.duration();

    let mut machine = PositionMachine::new(strategy.asset.as_str());
    let mut rows = Vec::with_capacity(view.enter.bars.len());
    let mut transactions = Vec::new();

    for bar in &view.enter.bars {
        let instant = bar.timestamp + step;
        let inputs = view.inputs_at(strategy, instant);
        let signal = signal::evaluate(strategy, &inputs, machine.position());

        if signal != Signal::None {
            match machine.apply(signal, instant) {
                Some(tx) => {
                    debug!(asset = %strategy.asset, %instant, comment = tx.comment(), "backtest transition");
                    transactions.push(tx);
                }
                None => debug!(asset = %strategy.asset, %instant, %signal, "signal ignored"),
            }
        }

        rows.push(BacktestRow {
            timestamp: bar.timestamp,
            close: bar.close,
            position: machine.position(),
        });
    }

    info!(
        asset = %strategy.asset,
        bars = rows.len(),
        transactions = transactions.len(),
        "backtest complete"
    );

    Ok(BacktestRun {
        asset: strategy.asset.clone(),
        series: BacktestSeries { rows },
        transactions,
    })
}

/// Runs independent backtests in parallel; each job owns its bars and machine.
pub fn run_backtests(
    jobs: Vec<(StrategyConfig, Vec<Bar>)>,
) -> Vec<(String, Result<BacktestRun, StochtraderError>)> {
    jobs.into_par_iter()
        .map(|(strategy, bars)| {
            let result = run_backtest(&bars, &strategy);
            (strategy.asset, result)
        })
        .collect()
}

/// Position series of the live bot, rebuilt from stored bars and transactions.
///
/// A transaction applies from the first bar whose period ends at or after it.
/// The first row is always flat.
pub fn series_from_transactions(bars: &[Bar], transactions: &[Transaction]) -> BacktestSeries {
    let mut ordered: Vec<&Transaction> = transactions.iter().collect();
    ordered.sort_by_key(|tx| tx.timestamp);

    let step = Interval::NATIVE.duration();
    let mut pending = ordered.into_iter().peekable();
    let mut position = Position::Flat;
    let mut rows = Vec::with_capacity(bars.len());

    for (i, bar) in bars.iter().enumerate() {
        let bar_end = bar.timestamp + step;
        while let Some(tx) = pending.next_if(|tx| tx.timestamp <= bar_end) {
            position = tx.kind.resulting_position();
        }
        rows.push(BacktestRow {
            timestamp: bar.timestamp,
            close: bar.close,
            position: if i == 0 { Position::Flat } else { position },
        });
    }

    BacktestSeries { rows }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::StochasticParams;
    use crate::domain::position::TransactionKind;
    use crate::domain::strategy::sample_strategy;
    use chrono::{Duration, NaiveDate};

    fn ts(i: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
            + Duration::minutes(i)
    }

    fn flat_bars(closes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar::new(ts(i as i64), c, c, c, c))
            .collect()
    }

    fn v_shape() -> Vec<f64> {
        let mut closes: Vec<f64> = (0..11).map(|i| 1.10 - 0.01 * i as f64).collect();
        closes.extend((1..20).map(|i| 1.00 + 0.01 * i as f64));
        closes
    }

    fn fast_strategy() -> StrategyConfig {
        StrategyConfig {
            enter_interval: Interval::M1,
            exit_interval: Interval::M1,
            start_hour: 0,
            end_hour: 23,
            enter: StochasticParams::new(5, 1, 3),
            exit: StochasticParams::new(5, 1, 3),
            long_threshold: 40.0,
            ..sample_strategy()
        }
    }

    #[test]
    fn v_shape_enters_long_once() {
        let run = run_backtest(&flat_bars(&v_shape()), &fast_strategy()).unwrap();
        assert_eq!(run.series.len(), 30);
        assert_eq!(run.transactions.len(), 1);
        assert_eq!(run.transactions[0].kind, TransactionKind::Long);
        assert_eq!(run.transactions[0].timestamp, ts(12));

        assert_eq!(run.series.rows[10].position, Position::Flat);
        assert_eq!(run.series.rows[11].position, Position::Long);
        assert_eq!(run.series.rows[29].position, Position::Long);
    }

    #[test]
    fn inconsistent_bar_fails_the_run() {
        let mut bars = flat_bars(&v_shape());
        bars[7].high = bars[7].low - 0.01;
        let err = run_backtest(&bars, &fast_strategy()).unwrap_err();
        assert!(matches!(err, StochtraderError::InconsistentBar { timestamp } if timestamp == ts(7)));
    }

    #[test]
    fn threshold_below_crossing_level_never_enters() {
        let strategy = StrategyConfig {
            long_threshold: 30.0,
            ..fast_strategy()
        };
        let run = run_backtest(&flat_bars(&v_shape()), &strategy).unwrap();
        assert!(run.transactions.is_empty());
        assert!(run.series.rows.iter().all(|r| r.position.is_flat()));
    }

    #[test]
    fn unordered_bars_rejected() {
        let mut bars = flat_bars(&[1.0, 2.0, 3.0]);
        bars.swap(0, 2);
        assert!(matches!(
            run_backtest(&bars, &fast_strategy()),
            Err(StochtraderError::NonTemporalIndex { .. })
        ));
    }

    #[test]
    fn parallel_runs_match_sequential() {
        let bars = flat_bars(&v_shape());
        let a = fast_strategy();
        let b = StrategyConfig {
            asset: "EURUSD".into(),
            long_threshold: 30.0,
            ..fast_strategy()
        };
        let results = run_backtests(vec![(a.clone(), bars.clone()), (b, bars.clone())]);
        assert_eq!(results.len(), 2);

        let sequential = run_backtest(&bars, &a).unwrap();
        let (asset, parallel) = &results[0];
        assert_eq!(asset, "DAX");
        assert_eq!(parallel.as_ref().unwrap().series, sequential.series);
        assert!(results[1].1.as_ref().unwrap().transactions.is_empty());
    }

    #[test]
    fn series_from_transactions_forward_fills() {
        let bars = flat_bars(&[1.0, 1.1, 1.2, 1.3, 1.4, 1.5]);
        let txs = vec![
            Transaction {
                timestamp: ts(4),
                asset: "DAX".into(),
                kind: TransactionKind::ClosingLong,
            },
            Transaction {
                timestamp: ts(2),
                asset: "DAX".into(),
                kind: TransactionKind::Long,
            },
        ];
        let series = series_from_transactions(&bars, &txs);
        let positions: Vec<Position> = series.rows.iter().map(|r| r.position).collect();
        // bar 1 covers [10:01, 10:02) and ends when the 10:02 transaction is logged
        assert_eq!(
            positions,
            vec![
                Position::Flat,
                Position::Long,
                Position::Long,
                Position::Flat,
                Position::Flat,
                Position::Flat,
            ]
        );
    }

    #[test]
    fn series_from_transactions_first_row_flat() {
        let bars = flat_bars(&[1.0, 1.1]);
        let txs = vec![Transaction {
            timestamp: ts(-5),
            asset: "DAX".into(),
            kind: TransactionKind::Short,
        }];
        let series = series_from_transactions(&bars, &txs);
        assert_eq!(series.rows[0].position, Position::Flat);
        assert_eq!(series.rows[1].position, Position::Short);
    }
}
