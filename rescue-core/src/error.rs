//! Errors raised by scoring and operator actions

use thiserror::Error;

/// Errors from triage computations and store operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TriageError {
    #[error("Missing signal: {0}")]
    MissingSignal(String),

    #[error("Unknown entity: {0}")]
    InvalidBoostTarget(String),

    #[error("Non-finite value for {0}")]
    NonFiniteValue(String),

    #[error("Invalid severity level {value} in signal {signal}")]
    InvalidLevel { signal: String, value: f64 },

    #[error("Duplicate entity id in snapshot: {0}")]
    DuplicateEntity(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
