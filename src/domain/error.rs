//! Domain error types.
//!
//! Errors fall into four families: data insufficiency (recovered locally as
//! "not ready"), malformed input, external collaborator failure and
//! configuration errors.

use chrono::NaiveDateTime;

/// Top-level error type for stochtrader.
#[derive(Debug, thiserror::Error)]
pub enum StochtraderError {
    #[error("cannot aggregate a bar from an empty sample set")]
    EmptySampleSet,

    #[error("non-finite price sample: {value}")]
    NonFiniteSample { value: f64 },

    #[error("bar at {timestamp} violates high >= open, close >= low")]
    InconsistentBar { timestamp: NaiveDateTime },

    #[error("bar series is not strictly increasing in time at {timestamp}")]
    NonTemporalIndex { timestamp: NaiveDateTime },

    #[error("malformed backtest series: {reason}")]
    MalformedSeries { reason: String },

    #[error("unknown interval '{0}' (expected one of 1T, 5T, 15T, 30T, 1H)")]
    InvalidInterval(String),

    #[error("insufficient data: have {bars} bars, need {minimum}")]
    InsufficientData { bars: usize, minimum: usize },

    #[error("no records for asset {asset}")]
    NoRecords { asset: String },

    #[error("price source error for {asset}: {reason}")]
    PriceSource { asset: String, reason: String },

    #[error("execution error for {asset}: {reason}")]
    Execution { asset: String, reason: String },

    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("CSV error in {file}: {reason}")]
    Csv { file: String, reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StochtraderError {
    /// Whether the error only means "not enough history yet".
    pub fn is_data_insufficiency(&self) -> bool {
        matches!(
            self,
            StochtraderError::InsufficientData { .. } | StochtraderError::NoRecords { .. }
        )
    }

    pub(crate) fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        StochtraderError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&StochtraderError> for std::process::ExitCode {
    fn from(err: &StochtraderError) -> Self {
        let code: u8 = match err {
            StochtraderError::Io(_) | StochtraderError::Csv { .. } => 1,
            StochtraderError::ConfigParse { .. }
            | StochtraderError::ConfigMissing { .. }
            | StochtraderError::ConfigInvalid { .. }
            | StochtraderError::InvalidInterval(_) => 2,
            StochtraderError::Database { .. }
            | StochtraderError::DatabaseQuery { .. }
            | StochtraderError::PriceSource { .. }
            | StochtraderError::Execution { .. } => 3,
            StochtraderError::EmptySampleSet
            | StochtraderError::NonFiniteSample { .. }
            | StochtraderError::NonTemporalIndex { .. }
            | StochtraderError::InconsistentBar { .. }
            | StochtraderError::MalformedSeries { .. } => 4,
            StochtraderError::InsufficientData { .. } | StochtraderError::NoRecords { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
