//! Order execution port.

use crate::domain::error::StochtraderError;

pub trait Executor {
    fn go_long(&self, asset: &str, size: f64) -> Result<(), StochtraderError>;
    fn go_short(&self, asset: &str, size: f64) -> Result<(), StochtraderError>;
}
