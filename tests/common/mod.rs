#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use stochtrader::domain::bar::Bar;
use stochtrader::domain::error::StochtraderError;
use stochtrader::domain::indicator::StochasticParams;
use stochtrader::domain::interval::Interval;
use stochtrader::domain::position::Transaction;
use stochtrader::domain::snapshot::IndicatorSnapshot;
use stochtrader::domain::strategy::{ExitFilter, StrategyConfig, StrategyKind};
use stochtrader::ports::execution_port::Executor;
use stochtrader::ports::price_port::PriceSource;
use stochtrader::ports::store_port::{BarStore, IndicatorStore, TransactionStore};

/// In-memory bar store with switchable failures.
#[derive(Default)]
pub struct MockBarStore {
    pub bars: RefCell<Vec<Bar>>,
    pub inserts: Cell<usize>,
    pub fail_inserts: Cell<bool>,
    pub fail_reads: Cell<bool>,
}

impl MockBarStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bars(bars: Vec<Bar>) -> Self {
        let store = Self::default();
        *store.bars.borrow_mut() = bars;
        store
    }
}

impl BarStore for MockBarStore {
    fn insert_bar(&self, bar: &Bar, _asset: &str) -> Result<(), StochtraderError> {
        if self.fail_inserts.get() {
            return Err(StochtraderError::Database {
                reason: "insert refused".into(),
            });
        }
        self.inserts.set(self.inserts.get() + 1);
        let mut bars = self.bars.borrow_mut();
        bars.retain(|b| b.timestamp != bar.timestamp);
        bars.push(bar.clone());
        bars.sort_by_key(|b| b.timestamp);
        Ok(())
    }

    fn get_last_n_bars(&self, n: usize, asset: &str) -> Result<Vec<Bar>, StochtraderError> {
        if self.fail_reads.get() {
            return Err(StochtraderError::DatabaseQuery {
                reason: "read refused".into(),
            });
        }
        let bars = self.bars.borrow();
        if bars.is_empty() {
            return Err(StochtraderError::NoRecords {
                asset: asset.to_string(),
            });
        }
        let start = bars.len().saturating_sub(n);
        Ok(bars[start..].to_vec())
    }
}

#[derive(Default)]
pub struct MockTransactionStore {
    pub logged: RefCell<Vec<Transaction>>,
    pub fail_logs: Cell<bool>,
}

impl MockTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history(history: Vec<Transaction>) -> Self {
        let store = Self::default();
        *store.logged.borrow_mut() = history;
        store
    }
}

impl TransactionStore for MockTransactionStore {
    fn log(&self, transaction: &Transaction) -> Result<(), StochtraderError> {
        if self.fail_logs.get() {
            return Err(StochtraderError::DatabaseQuery {
                reason: "log refused".into(),
            });
        }
        self.logged.borrow_mut().push(transaction.clone());
        Ok(())
    }

    fn get_last_n(&self, n: usize, asset: &str) -> Result<Vec<Transaction>, StochtraderError> {
        let logged = self.logged.borrow();
        let matching: Vec<Transaction> = logged.iter().filter(|t| t.asset == asset).cloned().collect();
        let start = matching.len().saturating_sub(n);
        Ok(matching[start..].to_vec())
    }
}

#[derive(Default)]
pub struct MockIndicatorStore {
    pub snapshots: RefCell<Vec<IndicatorSnapshot>>,
    pub fail: Cell<bool>,
}

impl IndicatorStore for MockIndicatorStore {
    fn log(&self, snapshot: &IndicatorSnapshot) -> Result<(), StochtraderError> {
        if self.fail.get() {
            return Err(StochtraderError::DatabaseQuery {
                reason: "snapshot refused".into(),
            });
        }
        self.snapshots.borrow_mut().push(snapshot.clone());
        Ok(())
    }
}

/// Records `(asset, direction, size)` per call.
#[derive(Default)]
pub struct MockExecutor {
    pub calls: RefCell<Vec<(String, i8, f64)>>,
    pub fail: Cell<bool>,
}

impl MockExecutor {
    fn record(&self, asset: &str, direction: i8, size: f64) -> Result<(), StochtraderError> {
        if self.fail.get() {
            return Err(StochtraderError::Execution {
                asset: asset.to_string(),
                reason: "broker rejected order".into(),
            });
        }
        self.calls.borrow_mut().push((asset.to_string(), direction, size));
        Ok(())
    }
}

impl Executor for MockExecutor {
    fn go_long(&self, asset: &str, size: f64) -> Result<(), StochtraderError> {
        self.record(asset, 1, size)
    }

    fn go_short(&self, asset: &str, size: f64) -> Result<(), StochtraderError> {
        self.record(asset, -1, size)
    }
}

/// Replays scripted results, then reports no price.
#[derive(Default)]
pub struct MockPriceSource {
    pub script: VecDeque<Result<Option<f64>, String>>,
    pub restarts: usize,
}

impl MockPriceSource {
    pub fn prices(prices: &[f64]) -> Self {
        Self {
            script: prices.iter().map(|&p| Ok(Some(p))).collect(),
            restarts: 0,
        }
    }

    pub fn failing(times: usize) -> Self {
        Self {
            script: (0..times).map(|_| Err("feed down".to_string())).collect(),
            restarts: 0,
        }
    }
}

impl PriceSource for MockPriceSource {
    fn get_price(&mut self) -> Result<Option<f64>, StochtraderError> {
        match self.script.pop_front() {
            Some(Ok(price)) => Ok(price),
            Some(Err(reason)) => Err(StochtraderError::PriceSource {
                asset: "mock".into(),
                reason,
            }),
            None => Ok(None),
        }
    }

    fn restart(&mut self) -> Result<(), StochtraderError> {
        self.restarts += 1;
        Ok(())
    }
}

pub fn start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 4)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap()
}

pub fn minute(i: i64) -> NaiveDateTime {
    start() + Duration::minutes(i)
}

/// One bar per minute from `start()` with open = high = low = close.
pub fn flat_bars(closes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| Bar::new(minute(i as i64), c, c, c, c))
        .collect()
}

/// 1.10 down to 1.00, then up to 1.19: one oversold crossing at bar 11.
pub fn v_shape() -> Vec<f64> {
    let mut closes: Vec<f64> = (0..11).map(|i| 1.10 - 0.01 * i as f64).collect();
    closes.extend((1..20).map(|i| 1.00 + 0.01 * i as f64));
    closes
}

/// Both timeframes on 1-minute bars with (5, 1, 3) oscillators, trading all day.
pub fn fast_strategy(asset: &str) -> StrategyConfig {
    StrategyConfig {
        asset: asset.to_string(),
        kind: StrategyKind::Crossover,
        exit_filter: ExitFilter::WithTrend,
        enter_interval: Interval::M1,
        exit_interval: Interval::M1,
        start_hour: 0,
        end_hour: 23,
        enter: StochasticParams::new(5, 1, 3),
        exit: StochasticParams::new(5, 1, 3),
        long_threshold: 40.0,
        short_threshold: 70.0,
        position_size: 2.0,
        fee: 0.0,
    }
}

pub const FAST_INI: &str = r#"
[bot]
assets = DAX
sample_period_ms = 250
reset_period_minutes = 30

[DAX]
enter_interval = 1T
exit_interval = 1T
start_hour = 0
end_hour = 23
enter_k_period = 5
enter_smooth = 1
enter_d_period = 3
exit_k_period = 5
exit_smooth = 1
exit_d_period = 3
long_threshold = 40
short_threshold = 70
position_size = 2
"#;
