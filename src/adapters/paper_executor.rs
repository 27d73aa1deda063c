//! Execution actuator that records orders instead of routing them to a broker.

use std::sync::Mutex;

use tracing::info;

use crate::domain::error::StochtraderError;
use crate::ports::execution_port::Executor;

#[derive(Debug, Clone, PartialEq)]
pub struct PaperOrder {
    pub asset: String,
    /// +1 buy, -1 sell.
    pub direction: i8,
    pub size: f64,
}

#[derive(Debug, Default)]
pub struct PaperExecutor {
    orders: Mutex<Vec<PaperOrder>>,
}

impl PaperExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn orders(&self) -> Vec<PaperOrder> {
        self.orders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn record(&self, asset: &str, direction: i8, size: f64) {
        info!(asset, direction, size, "paper order");
        self.orders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(PaperOrder {
                asset: asset.to_string(),
                direction,
                size,
            });
    }
}

impl Executor for PaperExecutor {
    fn go_long(&self, asset: &str, size: f64) -> Result<(), StochtraderError> {
        self.record(asset, 1, size);
        Ok(())
    }

    fn go_short(&self, asset: &str, size: f64) -> Result<(), StochtraderError> {
        self.record(asset, -1, size);
        Ok(())
    }
}
