//! Raw tick acquisition port.

use crate::domain::error::StochtraderError;

pub trait PriceSource {
    /// Polls the latest price; `Ok(None)` when no quote is available right now.
    fn get_price(&mut self) -> Result<Option<f64>, StochtraderError>;

    /// Re-establishes the underlying feed after a failure.
    fn restart(&mut self) -> Result<(), StochtraderError>;
}
