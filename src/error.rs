//! Error types for state updates.

use thiserror::Error;

/// Main error type for state operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Type mismatch for field {field}: expected {expected}, got {got}")]
    TypeMismatch {
        field: String,
        expected: String,
        got: String,
    },

    #[error("State must be an object, got {0}")]
    NotAnObject(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Updater panicked: {0}")]
    UpdaterPanicked(String),
}

impl From<serde_json::Error> for StateError {
    fn from(e: serde_json::Error) -> Self {
        StateError::Serialization(e.to_string())
    }
}

/// Result type for state operations.
pub type Result<T> = std::result::Result<T, StateError>;
