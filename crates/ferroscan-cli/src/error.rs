use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] ferroscan_core::ValidationError),

    #[error(transparent)]
    Scan(#[from] ferroscan_core::ScanError),

    #[error("strict mode failed: run status is {status} ({gaps} fetch gaps, {errors} validation errors)")]
    StrictModeViolation {
        status: &'static str,
        gaps: usize,
        errors: usize,
    },

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) => 2,
            Self::Scan(ferroscan_core::ScanError::InvalidConfig(_)) => 2,
            Self::Scan(ferroscan_core::ScanError::UpstreamUnavailable { .. }) => 3,
            Self::Scan(ferroscan_core::ScanError::Serialization(_)) => 4,
            Self::Scan(ferroscan_core::ScanError::Internal(_)) => 3,
            Self::StrictModeViolation { .. } => 5,
            Self::Serialization(_) => 4,
            Self::Io(_) => 10,
        }
    }
}
