//! Live evaluation loop: per-asset context and the scheduler driving it.
//!
//! Each tracked asset owns an `AssetContext`. The scheduler samples every
//! active asset on each tick, closes the 1-minute bar once per minute
//! boundary, evaluates the strategy on the stored history and acts on any
//! position transition. Collaborator failures count against a bound; an
//! asset that reaches it is suspended until the next reset tick.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{Duration, NaiveDateTime};
use tracing::{debug, error, info, warn};

use crate::domain::bar::Bar;
use crate::domain::error::StochtraderError;
use crate::domain::interval::Interval;
use crate::domain::position::{Position, PositionMachine, Transaction, TransactionKind};
use crate::domain::signal;
use crate::domain::snapshot::{IndicatorSnapshot, MarketView};
use crate::domain::strategy::StrategyConfig;
use crate::ports::execution_port::Executor;
use crate::ports::price_port::PriceSource;
use crate::ports::store_port::{BarStore, IndicatorStore, TransactionStore};

/// Failures tolerated per asset between reset ticks.
pub const MAX_FAILURES: u32 = 3;

/// Raw samples of the open bar. Cloning shares the buffer.
#[derive(Debug, Clone, Default)]
pub struct SampleBuffer {
    inner: Arc<Mutex<Vec<f64>>>,
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<f64>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push(&self, price: f64) {
        self.lock().push(price);
    }

    /// Snapshots and clears the buffer under one lock.
    pub fn take(&self) -> Vec<f64> {
        std::mem::take(&mut *self.lock())
    }

    /// Puts drained samples back ahead of anything pushed since.
    pub fn restore(&self, mut samples: Vec<f64>) {
        let mut guard = self.lock();
        samples.append(&mut guard);
        *guard = samples;
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Collaborators shared by every asset, constructed once by the caller.
#[derive(Clone, Copy)]
pub struct Services<'a> {
    pub bars: &'a dyn BarStore,
    pub transactions: &'a dyn TransactionStore,
    pub indicators: Option<&'a dyn IndicatorStore>,
    pub executor: &'a dyn Executor,
}

#[derive(Debug)]
pub struct AssetContext {
    strategy: StrategyConfig,
    buffer: SampleBuffer,
    machine: PositionMachine,
    last_flush: Option<NaiveDateTime>,
    failures: u32,
    suspended: bool,
}

impl AssetContext {
    pub fn new(strategy: StrategyConfig, position: Position) -> Self {
        let machine = PositionMachine::with_position(strategy.asset.as_str(), position);
        AssetContext {
            strategy,
            buffer: SampleBuffer::new(),
            machine,
            last_flush: None,
            failures: 0,
            suspended: false,
        }
    }

    /// Resumes the position recorded in the transaction store.
    pub fn restore(
        strategy: StrategyConfig,
        transactions: &dyn TransactionStore,
    ) -> Result<Self, StochtraderError> {
        let position = transactions.get_current_position(&strategy.asset)?;
        info!(asset = %strategy.asset, %position, "restored position");
        Ok(Self::new(strategy, position))
    }

    pub fn asset(&self) -> &str {
        &self.strategy.asset
    }

    pub fn strategy(&self) -> &StrategyConfig {
        &self.strategy
    }

    pub fn position(&self) -> Position {
        self.machine.position()
    }

    /// Shared handle to the open bar's samples.
    pub fn buffer(&self) -> SampleBuffer {
        self.buffer.clone()
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// One high-frequency tick: polls the source and appends the price.
    pub fn sample(&mut self, source: &mut dyn PriceSource) -> Result<(), StochtraderError> {
        if self.suspended {
            return Ok(());
        }

        match source.get_price() {
            Ok(Some(price)) if price.is_finite() => {
                self.buffer.push(price);
                Ok(())
            }
            Ok(Some(price)) => {
                warn!(asset = %self.strategy.asset, price, "discarding non-finite price");
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(err) => {
                let err = self.fail(err);
                if let Err(restart_err) = source.restart() {
                    warn!(asset = %self.strategy.asset, error = %restart_err, "price source restart failed");
                }
                Err(err)
            }
        }
    }

    /// Closes the bar for the minute ending at `now`, stores it and evaluates.
    ///
    /// A second call within the same minute boundary is a no-op, as is a
    /// boundary with no samples. A suspended asset discards its samples. A
    /// failed insert keeps them buffered and leaves the boundary open.
    pub fn close_bar(
        &mut self,
        now: NaiveDateTime,
        services: &Services<'_>,
    ) -> Result<Option<Transaction>, StochtraderError> {
        if self.suspended {
            let stale = self.buffer.take();
            if !stale.is_empty() {
                debug!(asset = %self.strategy.asset, samples = stale.len(), "suspended; discarding samples");
            }
            return Ok(None);
        }

        let boundary = Interval::NATIVE.floor(now);
        if self.last_flush == Some(boundary) {
            debug!(asset = %self.strategy.asset, %boundary, "bar already flushed");
            return Ok(None);
        }
        let previous_flush = self.last_flush.replace(boundary);

        let samples = self.buffer.take();
        if samples.is_empty() {
            debug!(asset = %self.strategy.asset, %boundary, "no samples to flush");
            return Ok(None);
        }

        let bar = Bar::from_samples(&samples, boundary - Interval::NATIVE.duration())?;
        if let Err(e) = services.bars.insert_bar(&bar, &self.strategy.asset) {
            self.buffer.restore(samples);
            self.last_flush = previous_flush;
            return Err(self.fail(e));
        }
        info!(
            asset = %self.strategy.asset,
            timestamp = %bar.timestamp,
            samples = samples.len(),
            close = bar.close,
            "bar stored"
        );

        self.evaluate(boundary, services)
    }

    /// Runs the strategy on stored history at `now` and acts on a transition.
    pub fn evaluate(
        &mut self,
        now: NaiveDateTime,
        services: &Services<'_>,
    ) -> Result<Option<Transaction>, StochtraderError> {
        if self.suspended {
            return Ok(None);
        }

        let needed = self.strategy.required_base_bars();
        let bars = match services.bars.get_last_n_bars(needed, &self.strategy.asset) {
            Ok(bars) => bars,
            Err(e) if e.is_data_insufficiency() => {
                debug!(asset = %self.strategy.asset, "no stored bars yet");
                return Ok(None);
            }
            Err(e) => return Err(self.fail(e)),
        };

        let view = MarketView::build(&bars, &self.strategy)?;
        let inputs = view.inputs_at(&self.strategy, now);
        if !inputs.is_ready() {
            debug!(asset = %self.strategy.asset, bars = bars.len(), needed, "indicators not ready");
            return Ok(None);
        }

        if let (Some(store), Some(snapshot)) = (
            services.indicators,
            IndicatorSnapshot::from_inputs(&self.strategy.asset, now, &inputs),
        ) {
            if let Err(e) = store.log(&snapshot) {
                self.fail(e);
            }
        }

        let signal = signal::evaluate(&self.strategy, &inputs, self.machine.position());
        let Some(kind) = self.machine.transition(signal) else {
            debug!(asset = %self.strategy.asset, %signal, position = %self.position(), "no transition");
            return Ok(None);
        };

        let size = self.strategy.position_size;
        let executed = match kind {
            TransactionKind::Long | TransactionKind::ClosingShort => {
                services.executor.go_long(&self.strategy.asset, size)
            }
            TransactionKind::Short | TransactionKind::ClosingLong => {
                services.executor.go_short(&self.strategy.asset, size)
            }
        };
        executed.map_err(|e| self.fail(e))?;

        let tx = self.machine.commit(kind, now);
        info!(
            asset = %tx.asset,
            comment = tx.comment(),
            action = tx.action(),
            %now,
            "position changed"
        );

        services.transactions.log(&tx).map_err(|e| self.fail(e))?;
        Ok(Some(tx))
    }

    /// Periodic reset: clears the failure count and lifts a suspension.
    pub fn reset_failures(&mut self) {
        if self.suspended {
            info!(asset = %self.strategy.asset, "resuming suspended asset");
        }
        self.failures = 0;
        self.suspended = false;
    }

    fn fail(&mut self, err: StochtraderError) -> StochtraderError {
        self.failures += 1;
        warn!(
            asset = %self.strategy.asset,
            failures = self.failures,
            error = %err,
            "collaborator failure"
        );
        if self.failures >= MAX_FAILURES && !self.suspended {
            self.suspended = true;
            error!(
                asset = %self.strategy.asset,
                failures = self.failures,
                "asset suspended after repeated failures; operator attention required"
            );
        }
        err
    }
}

pub struct TrackedAsset {
    pub context: AssetContext,
    pub source: Box<dyn PriceSource>,
}

/// Drives every tracked asset from one thread.
pub struct Scheduler<'a> {
    assets: Vec<TrackedAsset>,
    services: Services<'a>,
    reset_period: Duration,
    current_minute: Option<NaiveDateTime>,
    last_reset: Option<NaiveDateTime>,
}

impl<'a> Scheduler<'a> {
    pub fn new(services: Services<'a>, reset_period: Duration) -> Self {
        Scheduler {
            assets: Vec::new(),
            services,
            reset_period,
            current_minute: None,
            last_reset: None,
        }
    }

    pub fn track(&mut self, context: AssetContext, source: Box<dyn PriceSource>) {
        info!(asset = %context.asset(), "tracking asset");
        self.assets.push(TrackedAsset { context, source });
    }

    pub fn assets(&self) -> &[TrackedAsset] {
        &self.assets
    }

    /// One scheduler tick. On a new minute the previous bar is closed before
    /// the new sample is taken. Returns the transactions made on this tick.
    pub fn tick(&mut self, now: NaiveDateTime) -> Vec<Transaction> {
        let mut transactions = Vec::new();

        let minute = Interval::NATIVE.floor(now);
        let new_minute = self.current_minute.is_some_and(|m| m != minute);
        self.current_minute = Some(minute);

        if new_minute {
            for tracked in &mut self.assets {
                match tracked.context.close_bar(minute, &self.services) {
                    Ok(Some(tx)) => transactions.push(tx),
                    Ok(None) => {}
                    Err(e) => warn!(asset = %tracked.context.asset(), error = %e, "bar close failed"),
                }
            }
        }

        for tracked in &mut self.assets {
            if let Err(e) = tracked.context.sample(tracked.source.as_mut()) {
                debug!(asset = %tracked.context.asset(), error = %e, "sample skipped");
            }
        }

        match self.last_reset {
            Some(last) if now - last >= self.reset_period => {
                for tracked in &mut self.assets {
                    tracked.context.reset_failures();
                }
                self.last_reset = Some(now);
            }
            Some(_) => {}
            None => self.last_reset = Some(now),
        }

        transactions
    }
}
