//! Platform-wide error taxonomy. Every subsystem error folds into one of
//! these variants so HTTP handlers and the agent runtime can make a
//! single retry/surface decision regardless of which store or provider
//! produced it.

use stores::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("upstream service unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl PlatformError {
    /// Coarse category used for metrics and for deciding whether ingestion
    /// should retry or dead-letter.
    pub fn category(&self) -> &'static str {
        match self {
            PlatformError::InvalidInput(_) => "invalid_input",
            PlatformError::UpstreamUnavailable(_) => "upstream_unavailable",
            PlatformError::Timeout(_) => "timeout",
            PlatformError::NotFound(_) => "not_found",
            PlatformError::QuotaExceeded(_) => "quota_exceeded",
            PlatformError::Internal(_) => "internal",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PlatformError::UpstreamUnavailable(_) | PlatformError::Timeout(_)
        )
    }
}

impl From<StoreError> for PlatformError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(m) => PlatformError::NotFound(m),
            StoreError::InvalidInput(m) => PlatformError::InvalidInput(m),
            StoreError::Unavailable(m) => PlatformError::UpstreamUnavailable(m),
            StoreError::Timeout(d) => PlatformError::Timeout(format!("{d:?}")),
            StoreError::Internal(m) => PlatformError::Internal(m),
        }
    }
}

pub type PlatformResult<T> = Result<T, PlatformError>;
