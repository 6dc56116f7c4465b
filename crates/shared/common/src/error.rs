//! Unified error handling for the document store and its callers.
//!
//! Provides a single error type that covers:
//! - Expected store conditions (missing documents, revision conflicts)
//! - Undecodable documents
//! - Transport failures talking to the store

use domain::DomainError;
use thiserror::Error;

/// Application error types.
#[derive(Error, Debug)]
pub enum AppError {
    // Resource errors
    #[error("Resource not found")]
    NotFound,

    #[error("Document update conflict: {0}")]
    Conflict(String),

    // Validation
    #[error("{0}")]
    Validation(String),

    // Decoding
    #[error("Cannot decode document: {0}")]
    Decode(String),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    // Store errors
    #[error("Store error ({status}): {reason}")]
    Store { status: u16, reason: String },

    #[cfg(feature = "http")]
    #[error("HTTP error")]
    Http(#[from] reqwest::Error),

    // Internal
    #[error("Internal error")]
    Internal(String),
}

impl AppError {
    /// Get error code for callers
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Decode(_) => "DECODE_ERROR",
            AppError::Json(_) => "JSON_ERROR",
            AppError::Store { .. } => "STORE_ERROR",
            #[cfg(feature = "http")]
            AppError::Http(_) => "HTTP_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the error is the store's distinguished "no such document".
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound)
    }
}

// =============================================================================
// Domain Error Conversion
// =============================================================================

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Decode(msg) => AppError::Decode(msg),
        }
    }
}

/// Result type alias
pub type AppResult<T> = Result<T, AppError>;

/// Extension trait for Option -> AppError conversion
pub trait OptionExt<T> {
    fn ok_or_not_found(self) -> AppResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self) -> AppResult<T> {
        self.ok_or(AppError::NotFound)
    }
}

/// Convenience constructors
impl AppError {
    pub fn conflict(msg: impl Into<String>) -> Self {
        AppError::Conflict(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn store(status: u16, reason: impl Into<String>) -> Self {
        AppError::Store {
            status,
            reason: reason.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }
}
