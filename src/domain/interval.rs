//! Bar granularities supported by the resampler.

use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveDateTime, Timelike};

use crate::domain::error::StochtraderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Interval {
    M1,
    M5,
    M15,
    M30,
    H1,
}

impl Interval {
    pub const NATIVE: Interval = Interval::M1;

    pub fn minutes(self) -> u32 {
        match self {
            Interval::M1 => 1,
            Interval::M5 => 5,
            Interval::M15 => 15,
            Interval::M30 => 30,
            Interval::H1 => 60,
        }
    }

    pub fn duration(self) -> Duration {
        Duration::minutes(i64::from(self.minutes()))
    }

    /// Start of the window containing `ts`. Windows are anchored at the top of the hour.
    pub fn floor(self, ts: NaiveDateTime) -> NaiveDateTime {
        let minute = ts.minute() - ts.minute() % self.minutes();
        ts.date()
            .and_hms_opt(ts.hour(), minute, 0)
            .unwrap_or(ts)
    }

    /// Whether `instant` sits on a boundary of this interval.
    pub fn is_boundary(self, instant: NaiveDateTime) -> bool {
        instant.minute() % self.minutes() == 0
    }
}

impl FromStr for Interval {
    type Err = StochtraderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1T" | "1m" | "1min" => Ok(Interval::M1),
            "5T" | "5m" | "5min" => Ok(Interval::M5),
            "15T" | "15m" | "15min" => Ok(Interval::M15),
            "30T" | "30m" | "30min" => Ok(Interval::M30),
            "1H" | "1h" | "60T" => Ok(Interval::H1),
            other => Err(StochtraderError::InvalidInterval(other.to_string())),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interval::M1 => write!(f, "1T"),
            Interval::M5 => write!(f, "5T"),
            Interval::M15 => write!(f, "15T"),
            Interval::M30 => write!(f, "30T"),
            Interval::H1 => write!(f, "1H"),
        }
    }
}
