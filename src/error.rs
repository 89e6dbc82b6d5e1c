// src/error.rs
//! Typed failures for the ingest run. Each one is isolated at the smallest unit that can
//! fail on its own (a fetch, a source, a platform) and never aborts the run.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    /// Breaker is open for the platform; no network call was made.
    #[error("circuit open for platform {platform}")]
    CircuitOpen { platform: String },

    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    #[error("transport error for {url}: {message}")]
    Transport { url: String, message: String },
}

impl FetchError {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, FetchError::CircuitOpen { .. })
    }
}

/// Low-level failure reported by an `HttpTransport` before any status is known.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError(format!("timeout: {err}"))
        } else {
            TransportError(err.to_string())
        }
    }
}

#[derive(Debug, Error)]
#[error("could not extract content from {source_url}: {reason}")]
pub struct ParseError {
    pub source_url: String,
    pub reason: String,
}

impl ParseError {
    pub fn new(source_url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("could not prepare database directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not encode column value: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum AlertDeliveryError {
    #[error("alert webhook request failed: {0}")]
    Request(String),

    #[error("alert webhook returned HTTP {0}")]
    Status(u16),
}
