use thiserror::Error;

use crate::source::SourceError;

/// Validation and contract errors exposed by `ferroscan-core`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol must start with an ASCII letter: '{ch}'")]
    SymbolInvalidStart { ch: char },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error("date must be formatted YYYY-MM-DD: '{value}'")]
    InvalidDate { value: String },
    #[error("timestamp is out of range: {value}")]
    TimestampOutOfRange { value: i64 },
    #[error("date range start {start} is after end {end}")]
    InvalidDateRange { start: String, end: String },
    #[error("invalid bar size '{value}', expected e.g. 1m, 5m, 15m, 1h")]
    InvalidBarSize { value: String },

    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },
    #[error("field '{field}' must be non-negative")]
    NegativeValue { field: &'static str },
    #[error("bar high must be >= low")]
    InvalidBarRange,

    #[error("unknown pattern '{name}'")]
    UnknownPattern { name: String },
    #[error("pattern '{pattern}' has no parameter named '{key}'")]
    UnknownParameter { pattern: String, key: String },
    #[error("parameter '{pattern}.{key}' expects a {expected}")]
    ParameterType {
        pattern: String,
        key: String,
        expected: &'static str,
    },
    #[error("parameter set for '{pattern}' targets version {requested}, rule is version {actual}")]
    ParameterVersion {
        pattern: String,
        requested: u64,
        actual: u32,
    },
    #[error("pattern '{pattern}' reads lookback width {width}, which the feature configuration does not compute")]
    MissingLookbackWidth { pattern: String, width: usize },
    #[error("pattern catalogue selection is empty")]
    EmptyCatalogue,

    #[error("configuration field '{field}' is invalid: {reason}")]
    InvalidConfig { field: &'static str, reason: String },
}

/// Run-level failures: the pipeline did not produce a result.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    InvalidConfig(#[from] ValidationError),

    /// Every request of one stage failed; `stage` names the endpoint.
    #[error("upstream unavailable: all {requested} {stage} fetches failed (last error: {last_error})")]
    UpstreamUnavailable {
        stage: &'static str,
        requested: usize,
        last_error: SourceError,
    },

    #[error("internal error: {0}")]
    Internal(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ScanError {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "scan.invalid_config",
            Self::UpstreamUnavailable { .. } => "scan.upstream_unavailable",
            Self::Internal(_) => "scan.internal",
            Self::Serialization(_) => "scan.serialization",
        }
    }
}
