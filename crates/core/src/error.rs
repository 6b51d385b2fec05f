//! Unified error types for the analytics engine.
//!
//! The taxonomy separates caller-visible rejections from internal pipeline
//! failures:
//! - `Rejected` (INGEST_00x): the event was never stored
//! - `RateLimited` (RATE_001): the event was dropped, caller should back off
//! - `Consumer` (PIPE_001): a transient aggregation failure, retried on the
//!   next sweep and never surfaced to the ingest caller
//! - `NotFound` (QUERY_001): query-side lookup miss

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Codes for inputs rejected at the ingest boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectedCode {
    /// INGEST_001: site id does not reference a known site
    UnknownSite,
    /// INGEST_002: site exists but is not active
    InactiveSite,
    /// INGEST_003: a required field is missing or malformed
    MalformedField,
}

impl RejectedCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownSite => "INGEST_001",
            Self::InactiveSite => "INGEST_002",
            Self::MalformedField => "INGEST_003",
        }
    }

    /// Get the HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::UnknownSite => 404,
            Self::InactiveSite => 403,
            Self::MalformedField => 400,
        }
    }
}

/// Unified error type for the analytics engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Input rejected at the ingest boundary; the event was never stored.
    #[error("[{code}] {message}")]
    Rejected {
        code: &'static str,
        message: String,
        http_status: u16,
    },

    /// Per-site admission ceiling exceeded; the event was dropped, not queued.
    #[error("[RATE_001] {message}")]
    RateLimited {
        message: String,
        retry_after: Option<u64>,
    },

    /// Transient failure in an aggregation consumer. Logged and retried on
    /// the next pass; never affects other buckets or sessions.
    #[error("[PIPE_001] {0}")]
    Consumer(String),

    /// Query-side lookup miss.
    #[error("[QUERY_001] {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a rejection error.
    pub fn rejected(code: RejectedCode, msg: impl Into<String>) -> Self {
        Self::Rejected {
            code: code.code(),
            message: msg.into(),
            http_status: code.http_status(),
        }
    }

    pub fn unknown_site(site_id: impl std::fmt::Display) -> Self {
        Self::rejected(RejectedCode::UnknownSite, format!("unknown site {site_id}"))
    }

    pub fn inactive_site(site_id: impl std::fmt::Display) -> Self {
        Self::rejected(
            RejectedCode::InactiveSite,
            format!("site {site_id} is not active"),
        )
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::rejected(RejectedCode::MalformedField, msg)
    }

    pub fn rate_limited(msg: impl Into<String>, retry_after: Option<u64>) -> Self {
        Self::RateLimited {
            message: msg.into(),
            retry_after,
        }
    }

    pub fn consumer(msg: impl Into<String>) -> Self {
        Self::Consumer(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Get the HTTP status code for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Rejected { http_status, .. } => *http_status,
            Self::RateLimited { .. } => 429,
            Self::Consumer(_) => 500,
            Self::NotFound(_) => 404,
            Self::Serialization(_) => 400,
            Self::Internal(_) => 500,
        }
    }

    /// Get the stable error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Rejected { code, .. } => code,
            Self::RateLimited { .. } => "RATE_001",
            Self::Consumer(_) => "PIPE_001",
            Self::NotFound(_) => "QUERY_001",
            Self::Serialization(_) => "INGEST_003",
            Self::Internal(_) => "INTERNAL_001",
        }
    }
}
