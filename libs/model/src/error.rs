//! Error types for parsing model values.

use thiserror::Error;

/// Errors that can occur when parsing room ids or regions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The input string is empty.
    #[error("value cannot be empty")]
    Empty,

    /// The room id is not a decimal 64-bit integer.
    #[error("invalid room id: {0}")]
    InvalidRoomId(String),

    /// The region name is not one of the known regions.
    #[error("unknown region: {0}")]
    UnknownRegion(String),
}

impl ParseError {
    /// Returns true if this error indicates the input was empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, ParseError::Empty)
    }
}
