//! Centralized error types for TabGraph.

use thiserror::Error;

/// Main error type for TabGraph operations.
#[derive(Error, Debug)]
pub enum TabGraphError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for TabGraph operations.
pub type TabGraphResult<T> = Result<T, TabGraphError>;

impl TabGraphError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
