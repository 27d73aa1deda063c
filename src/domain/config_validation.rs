//! Configuration validation.
//!
//! Builds validated strategy and bot settings from the INI layout: a `[bot]`
//! section listing the assets, and one section per asset.

use std::str::FromStr;

use chrono::Duration;

use crate::domain::error::StochtraderError;
use crate::domain::indicator::StochasticParams;
use crate::domain::interval::Interval;
use crate::domain::strategy::{ExitFilter, StrategyConfig, StrategyKind};
use crate::ports::config_port::ConfigPort;

pub const BOT_SECTION: &str = "bot";

#[derive(Debug, Clone, PartialEq)]
pub struct BotSettings {
    pub assets: Vec<String>,
    pub sample_period_ms: u64,
    pub reset_period: Duration,
}

pub fn bot_settings(config: &dyn ConfigPort) -> Result<BotSettings, StochtraderError> {
    let assets = config.get_list(BOT_SECTION, "assets");
    if assets.is_empty() {
        return Err(StochtraderError::ConfigMissing {
            section: BOT_SECTION.to_string(),
            key: "assets".to_string(),
        });
    }

    let sample_period_ms: u64 = optional(config, BOT_SECTION, "sample_period_ms")?.unwrap_or(100);
    if sample_period_ms == 0 {
        return Err(StochtraderError::invalid(BOT_SECTION, "sample_period_ms", "must be > 0"));
    }
    let reset_minutes: i64 = optional(config, BOT_SECTION, "reset_period_minutes")?.unwrap_or(60);
    if reset_minutes <= 0 {
        return Err(StochtraderError::invalid(
            BOT_SECTION,
            "reset_period_minutes",
            "must be > 0",
        ));
    }

    Ok(BotSettings {
        assets,
        sample_period_ms,
        reset_period: Duration::minutes(reset_minutes),
    })
}

/// Reads and validates the strategy section named `asset`.
pub fn build_strategy(config: &dyn ConfigPort, asset: &str) -> Result<StrategyConfig, StochtraderError> {
    let section = asset;

    let kind = optional_with(config, section, "strategy", StrategyKind::from_str)?.unwrap_or_default();
    let exit_filter =
        optional_with(config, section, "exit_filter", ExitFilter::from_str)?.unwrap_or_default();

    let strategy = StrategyConfig {
        asset: asset.to_string(),
        kind,
        exit_filter,
        enter_interval: required_interval(config, section, "enter_interval")?,
        exit_interval: required_interval(config, section, "exit_interval")?,
        start_hour: optional(config, section, "start_hour")?.unwrap_or(0),
        end_hour: optional(config, section, "end_hour")?.unwrap_or(23),
        enter: StochasticParams::new(
            required(config, section, "enter_k_period")?,
            required(config, section, "enter_smooth")?,
            required(config, section, "enter_d_period")?,
        ),
        exit: StochasticParams::new(
            required(config, section, "exit_k_period")?,
            required(config, section, "exit_smooth")?,
            required(config, section, "exit_d_period")?,
        ),
        long_threshold: required(config, section, "long_threshold")?,
        short_threshold: required(config, section, "short_threshold")?,
        position_size: optional(config, section, "position_size")?.unwrap_or(1.0),
        fee: optional(config, section, "fee")?.unwrap_or(0.0),
    };

    strategy.validate()?;
    Ok(strategy)
}

pub fn build_strategies(config: &dyn ConfigPort) -> Result<Vec<StrategyConfig>, StochtraderError> {
    bot_settings(config)?
        .assets
        .iter()
        .map(|asset| build_strategy(config, asset))
        .collect()
}

fn required_interval(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Interval, StochtraderError> {
    let raw = required_string(config, section, key)?;
    raw.parse::<Interval>()
        .map_err(|e| StochtraderError::invalid(section, key, e.to_string()))
}

fn required_string(config: &dyn ConfigPort, section: &str, key: &str) -> Result<String, StochtraderError> {
    match config.get_string(section, key) {
        Some(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(StochtraderError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }),
    }
}

fn required<T>(config: &dyn ConfigPort, section: &str, key: &str) -> Result<T, StochtraderError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    optional(config, section, key)?.ok_or_else(|| StochtraderError::ConfigMissing {
        section: section.to_string(),
        key: key.to_string(),
    })
}

fn optional<T>(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<T>, StochtraderError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    optional_with(config, section, key, T::from_str)
}

fn optional_with<T, E, F>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    parse: F,
) -> Result<Option<T>, StochtraderError>
where
    E: std::fmt::Display,
    F: Fn(&str) -> Result<T, E>,
{
    match config.get_string(section, key) {
        Some(raw) if !raw.trim().is_empty() => parse(raw.trim())
            .map(Some)
            .map_err(|e| StochtraderError::invalid(section, key, format!("'{}': {e}", raw.trim()))),
        _ => Ok(None),
    }
}
