//! Error types for Prodcat.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Provider throttled the request. Retried with backoff by the invocation helper.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Model timeout, internal error or service unavailable. Callers may retry the operation.
    #[error("Transient provider error: {0}")]
    Transient(String),

    #[error("Provider error: {0}")]
    Provider(String),

    /// The model answered, but not in a shape we can use.
    #[error("{0}")]
    ModelResponse(String),

    #[error("Invalid XML: {0}")]
    InvalidXml(String),

    #[error("Max retries exceeded for batch get: {remaining} keys still unprocessed after {attempts} retries")]
    UnprocessedKeys { remaining: usize, attempts: u32 },

    #[error("Vector index error: {0}")]
    Index(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether the whole operation may succeed if the caller tries again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::RateLimited(_) | Error::Transient(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
