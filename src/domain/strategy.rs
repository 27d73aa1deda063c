//! Per-asset strategy configuration.
//!
//! A `StrategyConfig` is a tagged struct: `kind` selects the exit-gating
//! policy, `exit_filter` the exit-timeframe polarity required for entries, and
//! the remaining fields are the numeric parameters shared by every kind.

use std::fmt;
use std::str::FromStr;

use crate::domain::error::StochtraderError;
use crate::domain::indicator::StochasticParams;
use crate::domain::interval::Interval;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrategyKind {
    /// Positions close only on an exit-timeframe crossover.
    #[default]
    Crossover,
    /// Crossover exits, plus an unconditional close once the session ends.
    SessionClose,
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "crossover" => Ok(StrategyKind::Crossover),
            "session_close" | "session-close" => Ok(StrategyKind::SessionClose),
            other => Err(format!(
                "unknown strategy '{other}' (expected crossover or session_close)"
            )),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Crossover => write!(f, "crossover"),
            StrategyKind::SessionClose => write!(f, "session_close"),
        }
    }
}

/// Which side of the exit %D the exit %K must sit on for an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExitFilter {
    /// Long entries need exit K > exit D, short entries exit K < exit D.
    #[default]
    WithTrend,
    /// Long entries need exit K < exit D, short entries exit K > exit D.
    AgainstTrend,
    Off,
}

impl FromStr for ExitFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "with_trend" | "with-trend" => Ok(ExitFilter::WithTrend),
            "against_trend" | "against-trend" => Ok(ExitFilter::AgainstTrend),
            "off" | "none" => Ok(ExitFilter::Off),
            other => Err(format!(
                "unknown exit filter '{other}' (expected with_trend, against_trend or off)"
            )),
        }
    }
}

impl fmt::Display for ExitFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitFilter::WithTrend => write!(f, "with_trend"),
            ExitFilter::AgainstTrend => write!(f, "against_trend"),
            ExitFilter::Off => write!(f, "off"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyConfig {
    pub asset: String,
    pub kind: StrategyKind,
    pub exit_filter: ExitFilter,
    pub enter_interval: Interval,
    pub exit_interval: Interval,
    /// Inclusive session window, hours of day.
    pub start_hour: u32,
    pub end_hour: u32,
    pub enter: StochasticParams,
    pub exit: StochasticParams,
    pub long_threshold: f64,
    pub short_threshold: f64,
    pub position_size: f64,
    /// Charged against the strategy return on every position change.
    pub fee: f64,
}

impl StrategyConfig {
    /// Checks every numeric constraint; `section` names the config section in errors.
    pub fn validate(&self) -> Result<(), StochtraderError> {
        let section = self.asset.as_str();

        for (prefix, params) in [("enter", &self.enter), ("exit", &self.exit)] {
            if params.k_period == 0 {
                return Err(StochtraderError::invalid(
                    section,
                    &format!("{prefix}_k_period"),
                    "must be > 0",
                ));
            }
            if params.smooth == 0 {
                return Err(StochtraderError::invalid(
                    section,
                    &format!("{prefix}_smooth"),
                    "must be > 0",
                ));
            }
            if params.d_period == 0 {
                return Err(StochtraderError::invalid(
                    section,
                    &format!("{prefix}_d_period"),
                    "must be > 0",
                ));
            }
        }

        for (key, value) in [
            ("long_threshold", self.long_threshold),
            ("short_threshold", self.short_threshold),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(StochtraderError::invalid(
                    section,
                    key,
                    format!("{value} is outside [0, 100]"),
                ));
            }
        }

        for (key, value) in [("start_hour", self.start_hour), ("end_hour", self.end_hour)] {
            if value > 23 {
                return Err(StochtraderError::invalid(
                    section,
                    key,
                    format!("{value} is not an hour of day"),
                ));
            }
        }
        if self.start_hour > self.end_hour {
            return Err(StochtraderError::invalid(
                section,
                "start_hour",
                format!("{} is after end_hour {}", self.start_hour, self.end_hour),
            ));
        }

        if !(self.position_size > 0.0 && self.position_size.is_finite()) {
            return Err(StochtraderError::invalid(
                section,
                "position_size",
                "must be a positive number",
            ));
        }
        if !(self.fee >= 0.0 && self.fee.is_finite()) {
            return Err(StochtraderError::invalid(section, "fee", "must be >= 0"));
        }

        Ok(())
    }

    pub fn in_session(&self, hour: u32) -> bool {
        (self.start_hour..=self.end_hour).contains(&hour)
    }

    /// Base (1-minute) bars to load so both oscillators have a current and
    /// previous %D value on completed bars.
    pub fn required_base_bars(&self) -> usize {
        [(self.enter_interval, self.enter), (self.exit_interval, self.exit)]
            .iter()
            .map(|(interval, params)| {
                let minutes = interval.minutes() as usize;
                (params.k_period + params.smooth + params.d_period) * minutes + minutes
            })
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
pub(crate) fn sample_strategy() -> StrategyConfig {
    StrategyConfig {
        asset: "DAX".into(),
        kind: StrategyKind::Crossover,
        exit_filter: ExitFilter::WithTrend,
        enter_interval: Interval::M1,
        exit_interval: Interval::M15,
        start_hour: 7,
        end_hour: 16,
        enter: StochasticParams::new(7, 2, 2),
        exit: StochasticParams::new(12, 2, 2),
        long_threshold: 29.0,
        short_threshold: 70.0,
        position_size: 100.0,
        fee: 0.0,
    }
}
