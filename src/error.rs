//! Error types shared across the harness.
//!
//! Only configuration and selection problems ever leave the benchmark core.
//! Broker and codec failures are recovered inside the trial runners and
//! surface as failure counts on the resulting `RunRecord`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BenchError>;

/// Errors that abort the suite before (or instead of) running trials.
#[derive(Debug, Error)]
pub enum BenchError {
    /// The configuration cannot produce a valid scenario matrix.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// The operator filter did not match any scenario.
    #[error("no scenarios match the selection: {0}")]
    EmptySelection(String),

    /// The operator filter could not be parsed.
    #[error("invalid scenario filter `{0}` (expected `T1.3`, `T1.1-T1.4` or a comma-separated list)")]
    InvalidFilter(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("codec error: {0}")]
    Codec(#[from] crate::codec::CodecError),
}

impl BenchError {
    /// Process exit code for this error when it reaches `main`.
    pub fn exit_code(&self) -> u8 {
        match self {
            BenchError::ConfigInvalid(_)
            | BenchError::EmptySelection(_)
            | BenchError::InvalidFilter(_) => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_and_config_errors_exit_with_two() {
        assert_eq!(BenchError::ConfigInvalid("x".into()).exit_code(), 2);
        assert_eq!(BenchError::EmptySelection("T9.1".into()).exit_code(), 2);
        assert_eq!(BenchError::InvalidFilter("??".into()).exit_code(), 2);
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        assert_eq!(BenchError::Io(io).exit_code(), 1);
    }

    #[test]
    fn messages_name_the_problem() {
        let err = BenchError::ConfigInvalid("message count must be greater than zero".into());
        assert_eq!(
            err.to_string(),
            "invalid configuration: message count must be greater than zero"
        );
    }
}
