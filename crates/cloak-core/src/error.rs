//! # Cloak Error Types
//!
//! Typed error handling for the token lifecycle.
//! All lifecycle and backend operations return `Result<T, CloakError>`.

use thiserror::Error;

/// Core error type for all token operations
#[derive(Debug, Error)]
pub enum CloakError {
    /// Missing or malformed required field
    #[error("Validation error: {0}")]
    Validation(String),

    /// Token absent from storage (never issued or already swept)
    #[error("Token not found or expired: {token}")]
    NotFound { token: String },

    /// Token was already completed
    #[error("Token already completed: {token}")]
    Conflict { token: String },

    /// Token window elapsed
    #[error("Token expired: {token}")]
    Expired { token: String },

    /// Storage unreachable or returned an error
    #[error("Backend error: {0}")]
    Backend(String),

    /// Stored record could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration errors (missing keys, invalid config)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Missing or wrong bearer credential
    #[error("Unauthorized")]
    Unauthorized,
}

impl CloakError {
    pub fn validation(message: impl Into<String>) -> Self {
        CloakError::Validation(message.into())
    }

    pub fn backend(err: impl std::fmt::Display) -> Self {
        CloakError::Backend(err.to_string())
    }

    /// Returns the HTTP status code appropriate for this error.
    ///
    /// Storage failures map to 400: callers only ever see a generic
    /// invalid-request response for them.
    pub fn status_code(&self) -> u16 {
        match self {
            CloakError::Validation(_) => 400,
            CloakError::NotFound { .. } => 404,
            CloakError::Conflict { .. } => 409,
            CloakError::Expired { .. } => 410,
            CloakError::Backend(_) => 400,
            CloakError::Serialization(_) => 400,
            CloakError::Configuration(_) => 500,
            CloakError::Unauthorized => 401,
        }
    }

    /// Stable machine-readable name of the error class
    pub fn kind(&self) -> &'static str {
        match self {
            CloakError::Validation(_) => "ValidationError",
            CloakError::NotFound { .. } => "NotFoundError",
            CloakError::Conflict { .. } => "ConflictError",
            CloakError::Expired { .. } => "ExpiredError",
            CloakError::Backend(_) | CloakError::Serialization(_) => "BackendError",
            CloakError::Configuration(_) => "ConfigurationError",
            CloakError::Unauthorized => "Unauthorized",
        }
    }

    /// True for failures originating in storage rather than in the lifecycle rules
    pub fn is_backend(&self) -> bool {
        matches!(self, CloakError::Backend(_) | CloakError::Serialization(_))
    }
}

impl From<serde_json::Error> for CloakError {
    fn from(err: serde_json::Error) -> Self {
        CloakError::Serialization(err.to_string())
    }
}

/// Result type alias for token operations
pub type CloakResult<T> = Result<T, CloakError>;
