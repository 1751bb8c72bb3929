//! Error types for the MFA service.

use thiserror::Error;

/// Result type alias for the MFA service.
pub type Result<T, E = MfaError> = std::result::Result<T, E>;

/// Main error type for the MFA service.
#[derive(Error, Debug)]
pub enum MfaError {
    /// The submitted code did not match.
    #[error("Invalid verification code")]
    InvalidCode,

    /// The challenge no longer exists or is past its expiry.
    #[error("Challenge has expired")]
    Expired,

    /// The attempt budget for this method is exhausted.
    #[error("Too many verification attempts")]
    TooManyAttempts,

    /// Rate limiting errors (resend intervals, daily caps)
    #[error("Rate limit exceeded: {message}")]
    RateLimit { message: String },

    /// The method has no enrollment record for this user.
    #[error("Not set up: {message}")]
    NotSetUp { message: String },

    /// The method is already enabled and cannot be set up again.
    #[error("Already enabled: {message}")]
    AlreadyEnabled { message: String },

    /// Input validation errors
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// SMS delivery channel errors
    #[error("Delivery failed: {message}")]
    Delivery { message: String },

    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Network/HTTP errors
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Storage-specific errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Operation failed: {message}")]
    OperationFailed { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Storage backend not available")]
    BackendUnavailable,
}

impl MfaError {
    /// Create a new rate limit error
    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::RateLimit {
            message: message.into(),
        }
    }

    /// Create a new not set up error
    pub fn not_set_up(message: impl Into<String>) -> Self {
        Self::NotSetUp {
            message: message.into(),
        }
    }

    /// Create a new already enabled error
    pub fn already_enabled(message: impl Into<String>) -> Self {
        Self::AlreadyEnabled {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a new delivery error
    pub fn delivery(message: impl Into<String>) -> Self {
        Self::Delivery {
            message: message.into(),
        }
    }

    /// Create a new internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl StorageError {
    /// Create a new connection failed error
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            message: message.into(),
        }
    }

    /// Create a new operation failed error
    pub fn operation_failed(message: impl Into<String>) -> Self {
        Self::OperationFailed {
            message: message.into(),
        }
    }

    /// Create a new serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }
}
