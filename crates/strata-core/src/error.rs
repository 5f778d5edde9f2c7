//! Error types for the strata pipeline.
//!
//! This module provides the [`StrataError`] type, the standard error used
//! throughout the workspace. Every per-request variant carries enough
//! information for the error trap to map it to an HTTP status and a safe
//! JSON envelope without exposing internal diagnostic detail.
//!
//! Two variants are special:
//!
//! - [`StrataError::InvalidMiddleware`] is a registration-time failure and
//!   is fatal to startup; it never flows through a request.
//! - [`StrataError::DoubleNext`] marks a programming defect in a middleware
//!   (delegating downstream more than once for a single request) and is
//!   trapped per-request as a server error.

use http::StatusCode;
use thiserror::Error;

/// Result type alias using [`StrataError`].
pub type StrataResult<T> = Result<T, StrataError>;

/// Standard error type for the strata pipeline.
///
/// `StrataError` provides structured errors with HTTP status code mapping
/// and stable machine-readable codes for response envelopes.
///
/// # Example
///
/// ```
/// use strata_core::StrataError;
///
/// fn decode(body: &[u8]) -> Result<(), StrataError> {
///     if body.is_empty() {
///         return Err(StrataError::validation("empty request body"));
///     }
///     Ok(())
/// }
/// ```
#[derive(Error, Debug)]
pub enum StrataError {
    /// A middleware failed validation at registration time.
    ///
    /// Raised while the pipeline is being configured, before the server
    /// accepts traffic. Fatal to startup.
    #[error("invalid middleware registration: {reason}")]
    InvalidMiddleware {
        /// Why the registration was rejected.
        reason: String,
    },

    /// A middleware invoked its downstream continuation more than once.
    #[error("middleware `{middleware}` invoked next more than once")]
    DoubleNext {
        /// Name of the misbehaving middleware stage.
        middleware: &'static str,
    },

    /// Request validation failed (malformed body, bad input).
    #[error("validation error: {message}")]
    Validation {
        /// Human-readable error message.
        message: String,
    },

    /// The request body exceeded the configured size limit.
    #[error("request body exceeds limit of {limit_bytes} bytes")]
    PayloadTooLarge {
        /// The configured limit in bytes.
        limit_bytes: usize,
    },

    /// The request was refused (e.g., disallowed cross-origin request
    /// or a forbidden file path).
    #[error("forbidden: {message}")]
    Forbidden {
        /// Human-readable error message.
        message: String,
    },

    /// A resource was not found.
    #[error("not found: {message}")]
    NotFound {
        /// Human-readable error message.
        message: String,
    },

    /// A deadline expired while awaiting downstream completion.
    #[error("timeout: {message}")]
    Timeout {
        /// Human-readable error message.
        message: String,
    },

    /// Internal failure inside a middleware or handler.
    #[error("internal error: {message}")]
    Internal {
        /// Human-readable error message.
        message: String,
        /// The underlying error (never exposed to clients).
        #[source]
        source: Option<anyhow::Error>,
    },
}

impl StrataError {
    /// Creates an invalid-middleware registration error.
    #[must_use]
    pub fn invalid_middleware(reason: impl Into<String>) -> Self {
        Self::InvalidMiddleware {
            reason: reason.into(),
        }
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a forbidden error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Creates an internal error with a message only.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an internal error wrapping an underlying cause.
    ///
    /// The cause is kept for logging; it is never serialized into a
    /// client-facing response.
    #[must_use]
    pub fn internal_with(message: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::InvalidMiddleware { .. } | Self::DoubleNext { .. } | Self::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns the stable machine-readable code for response envelopes.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidMiddleware { .. } => "INVALID_MIDDLEWARE",
            Self::DoubleNext { .. } => "DOUBLE_NEXT",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            Self::Forbidden { .. } => "FORBIDDEN",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Returns `true` if this error represents a server-side defect
    /// whose detail must be suppressed in client responses by default.
    #[must_use]
    pub fn is_internal(&self) -> bool {
        self.status_code().is_server_error()
    }
}

impl From<std::io::Error> for StrataError {
    fn from(err: std::io::Error) -> Self {
        Self::internal_with("I/O failure", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_mapping() {
        assert_eq!(
            StrataError::validation("bad").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            StrataError::PayloadTooLarge { limit_bytes: 1024 }.status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            StrataError::forbidden("no").status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            StrataError::not_found("gone").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            StrataError::timeout("slow").status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            StrataError::internal("boom").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            StrataError::DoubleNext { middleware: "cors" }.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(StrataError::validation("x").code(), "VALIDATION_ERROR");
        assert_eq!(
            StrataError::DoubleNext { middleware: "m" }.code(),
            "DOUBLE_NEXT"
        );
        assert_eq!(
            StrataError::invalid_middleware("dup").code(),
            "INVALID_MIDDLEWARE"
        );
        assert_eq!(StrataError::internal("x").code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_internal_with_preserves_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let err = StrataError::internal_with("read failed", io);
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.is_internal());
    }

    #[test]
    fn test_double_next_names_the_stage() {
        let err = StrataError::DoubleNext { middleware: "body_decoder" };
        assert!(err.to_string().contains("body_decoder"));
    }

    #[test]
    fn test_client_errors_are_not_internal() {
        assert!(!StrataError::validation("x").is_internal());
        assert!(!StrataError::not_found("x").is_internal());
        assert!(StrataError::internal("x").is_internal());
    }
}
