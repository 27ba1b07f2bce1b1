use thiserror::Error;

/// Error taxonomy shared by every store adapter. The agent runtime and
/// ingestion pipeline match on `kind()` to decide whether to retry,
/// dead-letter, or surface a structured error to the caller.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("upstream store unavailable: {0}")]
    Unavailable(String),

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("internal store error: {0}")]
    Internal(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
