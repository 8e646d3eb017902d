//! Error taxonomy and wire-format error codes.

use serde::{Deserialize, Serialize};

// ── Error code constants ────────────────────────────────────────────

/// Bad input shape or violated business rule.
pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
/// Resource does not exist.
pub const NOT_FOUND: &str = "NOT_FOUND";
/// Caller is not allowed to perform the operation.
pub const FORBIDDEN: &str = "FORBIDDEN";
/// Shared-store or authoritative-store I/O failure.
pub const STORE_UNAVAILABLE: &str = "STORE_UNAVAILABLE";
/// Real-time delivery failure.
pub const CHANNEL_ERROR: &str = "CHANNEL_ERROR";

/// Errors surfaced at operation boundaries.
///
/// Every error is converted into an explicit result (code + message) at the
/// boundary of the operation that caused it; no error escapes a component
/// mid-mutation with partially applied state.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Bad input or business-rule violation. Surfaced, never retried.
    #[error("{message}")]
    Validation {
        /// What was violated.
        message: String,
    },

    /// Requested resource not found. Surfaced, never retried.
    #[error("{what} not found")]
    NotFound {
        /// What was looked up (e.g. `"Event"`).
        what: String,
    },

    /// Caller is not the resource owner. Surfaced, never retried.
    #[error("{message}")]
    Authorization {
        /// Why the caller is not allowed.
        message: String,
    },

    /// Store I/O failure. Retried at most once for cleanup operations,
    /// otherwise surfaced.
    #[error("store unavailable: {message}")]
    TransientStore {
        /// Underlying failure description.
        message: String,
    },

    /// Real-time delivery failure. Logged, session notified, never fatal.
    #[error("{message}")]
    Channel {
        /// What failed.
        message: String,
    },
}

impl CoreError {
    /// Convenience constructor for validation failures.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Convenience constructor for not-found failures.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Machine-readable error code for this variant.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => VALIDATION_ERROR,
            Self::NotFound { .. } => NOT_FOUND,
            Self::Authorization { .. } => FORBIDDEN,
            Self::TransientStore { .. } => STORE_UNAVAILABLE,
            Self::Channel { .. } => CHANNEL_ERROR,
        }
    }

    /// Convert to the wire-format error body.
    #[must_use]
    pub fn to_error_body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code().to_owned(),
            message: self.to_string(),
        }
    }
}

/// Structured error body returned by mutation endpoints.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable code (e.g. `VALIDATION_ERROR`).
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_code() {
        let err = CoreError::validation("Already attending this event");
        assert_eq!(err.code(), VALIDATION_ERROR);
        assert_eq!(err.to_string(), "Already attending this event");
    }

    #[test]
    fn not_found_message() {
        let err = CoreError::not_found("Event");
        assert_eq!(err.code(), NOT_FOUND);
        assert_eq!(err.to_string(), "Event not found");
    }

    #[test]
    fn authorization_code() {
        let err = CoreError::Authorization {
            message: "Not authorized to update this event".into(),
        };
        assert_eq!(err.code(), FORBIDDEN);
    }

    #[test]
    fn transient_store_message_includes_cause() {
        let err = CoreError::TransientStore {
            message: "connection reset".into(),
        };
        assert_eq!(err.code(), STORE_UNAVAILABLE);
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn error_body_roundtrip() {
        let body = CoreError::validation("bad").to_error_body();
        let json = serde_json::to_string(&body).unwrap();
        let back: ErrorBody = serde_json::from_str(&json).unwrap();
        assert_eq!(back.code, VALIDATION_ERROR);
        assert_eq!(back.message, "bad");
    }
}
