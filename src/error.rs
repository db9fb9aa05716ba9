//! Error types for Tollgate.

use thiserror::Error;

use crate::algorithm::AlgorithmKind;

/// Main error type for Tollgate operations.
#[derive(Error, Debug)]
pub enum TollgateError {
    /// Configuration-related errors (invalid limit/window, unreadable policy files)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The request key was empty or whitespace only
    #[error("Request key cannot be blank")]
    InvalidKey,

    /// The store lost a state it had just committed
    #[error("State not found for key '{key}' after commit")]
    StateMissing { key: String },

    /// The store holds a state written by a different algorithm
    #[error("State for key '{key}' belongs to {found}, expected {expected}")]
    StateMismatch {
        key: String,
        expected: AlgorithmKind,
        found: AlgorithmKind,
    },

    /// Instant arithmetic left the representable range
    #[error("Time out of range: {0}")]
    TimeOutOfRange(String),

    /// State store backend errors
    #[error("Store error: {0}")]
    Store(String),

    /// The protected work returned an error
    #[error("Protected work failed: {0}")]
    Work(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The protected work panicked
    #[error("Protected work panicked: {0}")]
    WorkPanicked(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Tollgate operations.
pub type Result<T> = std::result::Result<T, TollgateError>;
