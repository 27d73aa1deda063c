//! CSV history reader for backtests.
//!
//! Two layouts are supported, selected by column name:
//! - standard: `timestamp,open,high,low,close` with ISO timestamps
//! - dukascopy: `Gmt time,Open,High,Low,Close,Volume` with day-first timestamps

use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::NaiveDateTime;
use tracing::debug;

use crate::domain::bar::Bar;
use crate::domain::error::StochtraderError;

const STANDARD_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];
const DUKASCOPY_FORMATS: &[&str] = &["%d.%m.%Y %H:%M:%S%.3f", "%d.%m.%Y %H:%M:%S"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryFormat {
    #[default]
    Standard,
    Dukascopy,
}

impl HistoryFormat {
    fn time_column(self) -> &'static str {
        match self {
            HistoryFormat::Standard => "timestamp",
            HistoryFormat::Dukascopy => "gmt time",
        }
    }

    fn time_formats(self) -> &'static [&'static str] {
        match self {
            HistoryFormat::Standard => STANDARD_FORMATS,
            HistoryFormat::Dukascopy => DUKASCOPY_FORMATS,
        }
    }
}

impl FromStr for HistoryFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(HistoryFormat::Standard),
            "dukascopy" => Ok(HistoryFormat::Dukascopy),
            other => Err(format!("unknown data format '{other}' (expected standard or dukascopy)")),
        }
    }
}

pub struct CsvHistoryReader {
    path: PathBuf,
    format: HistoryFormat,
}

impl CsvHistoryReader {
    pub fn new<P: AsRef<Path>>(path: P, format: HistoryFormat) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            format,
        }
    }

    /// Reads every row as a bar, sorted by timestamp.
    pub fn read_bars(&self) -> Result<Vec<Bar>, StochtraderError> {
        let file = self.path.display().to_string();
        let csv_err = |reason: String| StochtraderError::Csv {
            file: file.clone(),
            reason,
        };

        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&self.path)
            .map_err(|e| csv_err(e.to_string()))?;

        let headers = rdr.headers().map_err(|e| csv_err(e.to_string()))?.clone();
        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h.eq_ignore_ascii_case(name))
                .ok_or_else(|| csv_err(format!("missing column '{name}'")))
        };
        let time_idx = column(self.format.time_column())?;
        let open_idx = column("open")?;
        let high_idx = column("high")?;
        let low_idx = column("low")?;
        let close_idx = column("close")?;

        let mut bars = Vec::new();
        for (line, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| csv_err(e.to_string()))?;
            let row = line + 2;

            let raw_time = record.get(time_idx).unwrap_or_default();
            let timestamp = self
                .parse_time(raw_time)
                .ok_or_else(|| csv_err(format!("row {row}: invalid timestamp '{raw_time}'")))?;

            let price = |idx: usize, name: &str| -> Result<f64, StochtraderError> {
                let raw = record.get(idx).unwrap_or_default();
                raw.parse::<f64>()
                    .map_err(|e| csv_err(format!("row {row}: invalid {name} '{raw}': {e}")))
            };

            let bar = Bar::new(
                timestamp,
                price(open_idx, "open")?,
                price(high_idx, "high")?,
                price(low_idx, "low")?,
                price(close_idx, "close")?,
            );
            bar.validate()?;
            bars.push(bar);
        }

        bars.sort_by_key(|b| b.timestamp);
        debug!(file = %file, bars = bars.len(), "loaded history");
        Ok(bars)
    }

    fn parse_time(&self, raw: &str) -> Option<NaiveDateTime> {
        self.format
            .time_formats()
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
    }
}
