//! Core domain types and logic.

pub mod backtest;
pub mod bar;
pub mod config_validation;
pub mod error;
pub mod indicator;
pub mod interval;
pub mod live;
pub mod metrics;
pub mod position;
pub mod resample;
pub mod signal;
pub mod snapshot;
pub mod strategy;
