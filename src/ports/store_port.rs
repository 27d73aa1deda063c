//! Persistence ports for bars, transactions and indicator snapshots.

use crate::domain::bar::Bar;
use crate::domain::error::StochtraderError;
use crate::domain::position::{Position, Transaction};
use crate::domain::snapshot::IndicatorSnapshot;

pub trait BarStore {
    fn insert_bar(&self, bar: &Bar, asset: &str) -> Result<(), StochtraderError>;

    /// The `n` most recent bars, oldest first. `NoRecords` if the asset is unseen.
    fn get_last_n_bars(&self, n: usize, asset: &str) -> Result<Vec<Bar>, StochtraderError>;

    fn insert_bars(&self, bars: &[Bar], asset: &str) -> Result<(), StochtraderError> {
        for bar in bars {
            self.insert_bar(bar, asset)?;
        }
        Ok(())
    }
}

pub trait TransactionStore {
    fn log(&self, transaction: &Transaction) -> Result<(), StochtraderError>;

    /// The `n` most recent transactions, oldest first; empty if none.
    fn get_last_n(&self, n: usize, asset: &str) -> Result<Vec<Transaction>, StochtraderError>;

    fn get_current_position(&self, asset: &str) -> Result<Position, StochtraderError> {
        let last = self.get_last_n(1, asset)?;
        Ok(last
            .last()
            .map_or(Position::Flat, |tx| Position::from_comment(tx.comment())))
    }
}

pub trait IndicatorStore {
    fn log(&self, snapshot: &IndicatorSnapshot) -> Result<(), StochtraderError>;
}

/// A single backend serving all three stores.
pub trait Storage: BarStore + TransactionStore + IndicatorStore {
    fn bars(&self) -> &dyn BarStore;
    fn transactions(&self) -> &dyn TransactionStore;
    fn indicators(&self) -> &dyn IndicatorStore;
}

impl<T: BarStore + TransactionStore + IndicatorStore> Storage for T {
    fn bars(&self) -> &dyn BarStore {
        self
    }

    fn transactions(&self) -> &dyn TransactionStore {
        self
    }

    fn indicators(&self) -> &dyn IndicatorStore {
        self
    }
}
