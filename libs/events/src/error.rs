//! Error types for notification encoding.

use thiserror::Error;

/// Errors that can occur when encoding a notification.
#[derive(Debug, Error, Clone)]
pub enum EventError {
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for EventError {
    fn from(err: serde_json::Error) -> Self {
        EventError::Serialization(err.to_string())
    }
}
