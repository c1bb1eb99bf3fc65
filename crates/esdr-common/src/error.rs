//! ESDR Error - Unified Error Types
//!
//! Error handling shared by every ESDR crate. Errors are grouped into the
//! categories the API layer needs to distinguish: validation, missing
//! resources, authentication versus authorization, naming conflicts, and
//! internal storage failures.
//!
//! Key Features:
//! - Validation errors always carry the offending field name
//! - Authentication (no usable credential) kept apart from authorization
//!   (credential present but insufficient)
//! - User vs system error classification
//! - HTTP status mapping for the thin API layer
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Unified error type for all ESDR operations.
#[derive(Error, Debug)]
pub enum EsdrError {
    // Request errors
    #[error("validation failed for '{field}': {message}")]
    Validation { field: String, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("authentication required: {0}")]
    Authentication(String),

    #[error("access denied: {0}")]
    Authorization(String),

    #[error("conflict: {0}")]
    Conflict(String),

    // Storage errors
    #[error("storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    // Internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Type Aliases
// =============================================================================

/// Result type alias for ESDR operations.
pub type Result<T> = std::result::Result<T, EsdrError>;

// =============================================================================
// Constructors
// =============================================================================

impl EsdrError {
    /// Build a validation error for the given field.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        EsdrError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// The offending field, for validation errors.
    pub fn field(&self) -> Option<&str> {
        match self {
            EsdrError::Validation { field, .. } => Some(field),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for EsdrError {
    fn from(err: serde_json::Error) -> Self {
        EsdrError::Serialization(err.to_string())
    }
}

// =============================================================================
// Error Classification
// =============================================================================

impl EsdrError {
    /// Returns true if this is a user error (vs system error).
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            EsdrError::Validation { .. }
                | EsdrError::NotFound(_)
                | EsdrError::Authentication(_)
                | EsdrError::Authorization(_)
                | EsdrError::Conflict(_)
        )
    }

    /// HTTP status the API layer reports for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            EsdrError::Validation { .. } => 422,
            EsdrError::NotFound(_) => 404,
            EsdrError::Authentication(_) => 401,
            EsdrError::Authorization(_) => 403,
            EsdrError::Conflict(_) => 409,
            _ => 500,
        }
    }

    /// Short machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            EsdrError::Validation { .. } => "VALIDATION_ERROR",
            EsdrError::NotFound(_) => "NOT_FOUND",
            EsdrError::Authentication(_) => "UNAUTHORIZED",
            EsdrError::Authorization(_) => "FORBIDDEN",
            EsdrError::Conflict(_) => "CONFLICT",
            _ => "INTERNAL_ERROR",
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
