//! Domain-level errors.
//!
//! These errors represent stored documents that cannot be decoded.
//! They are independent of infrastructure concerns (HTTP, database client).

use thiserror::Error;

/// Domain-specific errors for profile records.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A stored document could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),
}

impl DomainError {
    /// Create a decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        DomainError::Decode(msg.into())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::Decode(err.to_string())
    }
}

/// Result type alias for domain operations
pub type DomainResult<T> = Result<T, DomainError>;
