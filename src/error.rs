//! Error types for askvid.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Library-level error type for askvid operations.
#[derive(Error, Debug)]
pub enum AskvidError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No transcript available for {0}")]
    TranscriptUnavailable(String),

    #[error("Video source error: {0}")]
    VideoSource(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after: Option<Duration> },

    #[error("Transient API failure: {0}")]
    TransientApiFailure(String),

    #[error("Authentication failed: {0}")]
    AuthFailure(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Dispatch failed after {attempts} attempts: {last}")]
    DispatchFailed { attempts: u32, last: Box<AskvidError> },

    #[error("Cache corruption: {0}")]
    CacheCorruption(String),

    #[error("Cache store error: {0}")]
    Cache(String),

    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    #[error("Request cancelled: {0}")]
    Cancelled(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("External tool not found: {0}. Please install it and ensure it's in your PATH.")]
    ToolNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Coarse error classification carried in answer outcomes and batch reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    TranscriptUnavailable,
    RateLimitExceeded,
    TransientApiFailure,
    AuthFailure,
    InvalidRequest,
    DispatchFailed,
    CacheCorruption,
    Cancelled,
    Setup,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::TranscriptUnavailable => "transcript_unavailable",
            ErrorKind::RateLimitExceeded => "rate_limit_exceeded",
            ErrorKind::TransientApiFailure => "transient_api_failure",
            ErrorKind::AuthFailure => "auth_failure",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::DispatchFailed => "dispatch_failed",
            ErrorKind::CacheCorruption => "cache_corruption",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Setup => "setup",
            ErrorKind::Internal => "internal",
        };
        write!(f, "{}", name)
    }
}

impl AskvidError {
    /// Classify this error for reporting.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AskvidError::TranscriptUnavailable(_) => ErrorKind::TranscriptUnavailable,
            AskvidError::RateLimitExceeded { .. } => ErrorKind::RateLimitExceeded,
            AskvidError::TransientApiFailure(_) | AskvidError::Http(_) => {
                ErrorKind::TransientApiFailure
            }
            AskvidError::AuthFailure(_) => ErrorKind::AuthFailure,
            AskvidError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            AskvidError::DispatchFailed { .. } => ErrorKind::DispatchFailed,
            AskvidError::CacheCorruption(_) => ErrorKind::CacheCorruption,
            AskvidError::Cancelled(_) => ErrorKind::Cancelled,
            AskvidError::Config(_)
            | AskvidError::ToolNotFound(_)
            | AskvidError::TomlParse(_) => ErrorKind::Setup,
            _ => ErrorKind::Internal,
        }
    }

    /// Whether the dispatcher should retry a request that failed with this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AskvidError::RateLimitExceeded { .. } | AskvidError::TransientApiFailure(_)
        )
    }

    /// Server-suggested delay before the next attempt, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            AskvidError::RateLimitExceeded { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Result type alias for askvid operations.
pub type Result<T> = std::result::Result<T, AskvidError>;
