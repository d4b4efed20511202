//! Error kind taxonomy shared across the control plane.
//!
//! Kinds carry the machine-readable tag used in HTTP error bodies
//! (`{"error": {"kind": ..., "message": ...}}`) and map to status codes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-readable error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    // Input
    ValidationError,
    LimitExceeded,
    NotFound,
    Conflict,
    // Transient
    FetchTimeout,
    LlmTimeout,
    LlmRateLimited,
    DbUnavailable,
    // Permanent
    FetchHttpError,
    ExtractionFailure,
    InvalidResponse,
    ProviderAuthError,
    // System
    BreakerOpen,
    SystemHalted,
    QueueFull,
    InternalError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "validation_error",
            Self::LimitExceeded => "limit_exceeded",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::FetchTimeout => "fetch_timeout",
            Self::LlmTimeout => "llm_timeout",
            Self::LlmRateLimited => "llm_rate_limited",
            Self::DbUnavailable => "db_unavailable",
            Self::FetchHttpError => "fetch_http_error",
            Self::ExtractionFailure => "extraction_failure",
            Self::InvalidResponse => "invalid_response",
            Self::ProviderAuthError => "provider_auth_error",
            Self::BreakerOpen => "breaker_open",
            Self::SystemHalted => "system_halted",
            Self::QueueFull => "queue_full",
            Self::InternalError => "internal_error",
        }
    }

    /// HTTP status code for API responses.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::ValidationError | Self::LimitExceeded | Self::SystemHalted => 400,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::QueueFull | Self::LlmRateLimited => 429,
            Self::FetchTimeout
            | Self::LlmTimeout
            | Self::DbUnavailable
            | Self::BreakerOpen => 503,
            Self::FetchHttpError
            | Self::ExtractionFailure
            | Self::InvalidResponse
            | Self::ProviderAuthError
            | Self::InternalError => 500,
        }
    }

    /// Whether a retry of the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::FetchTimeout
                | Self::LlmTimeout
                | Self::LlmRateLimited
                | Self::DbUnavailable
                | Self::BreakerOpen
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified error with a human-readable message.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serde_snake_case() {
        let json = serde_json::to_string(&ErrorKind::LimitExceeded).unwrap();
        assert_eq!(json, r#""limit_exceeded""#);

        let parsed: ErrorKind = serde_json::from_str(r#""breaker_open""#).unwrap();
        assert_eq!(parsed, ErrorKind::BreakerOpen);
    }

    #[test]
    fn test_kind_as_str_matches_serde() {
        for kind in [
            ErrorKind::ValidationError,
            ErrorKind::NotFound,
            ErrorKind::InvalidResponse,
            ErrorKind::SystemHalted,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ErrorKind::ValidationError.status_code(), 400);
        assert_eq!(ErrorKind::LimitExceeded.status_code(), 400);
        assert_eq!(ErrorKind::NotFound.status_code(), 404);
        assert_eq!(ErrorKind::Conflict.status_code(), 409);
        assert_eq!(ErrorKind::BreakerOpen.status_code(), 503);
        assert_eq!(ErrorKind::InternalError.status_code(), 500);
    }

    #[test]
    fn test_transient_classification() {
        assert!(ErrorKind::FetchTimeout.is_transient());
        assert!(ErrorKind::LlmRateLimited.is_transient());
        assert!(!ErrorKind::InvalidResponse.is_transient());
        assert!(!ErrorKind::ProviderAuthError.is_transient());
    }

    #[test]
    fn test_classified_error_display() {
        let err = ClassifiedError::new(ErrorKind::NotFound, "run 42 not found");
        assert_eq!(err.to_string(), "not_found: run 42 not found");
    }
}
