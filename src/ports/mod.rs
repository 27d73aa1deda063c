//! Port traits for the collaborators the core talks to.

pub mod config_port;
pub mod execution_port;
pub mod price_port;
pub mod store_port;
