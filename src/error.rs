//! Unified error handling for the pinglun crate
//!
//! Domain-specific errors ([`FetchError`], [`ResolveError`]) cover the two
//! failure surfaces of an acquisition run; the unified [`Error`] enum wraps
//! them together with storage and serialization errors so module boundaries
//! share a single `Result` alias.

use std::io;
use thiserror::Error;

/// Errors that can occur while talking to the remote comment API
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP request error (unreachable host, connect/read failure)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx response from the remote endpoint
    #[error("Server error: {0}")]
    ServerError(u16),

    /// Request timeout
    #[error("Request timeout")]
    Timeout,

    /// Response body was not the expected JSON envelope
    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// Errors that can occur while resolving a BV handle to an object id
#[derive(Error, Debug)]
pub enum ResolveError {
    /// Video page fetch failed
    #[error("Failed to fetch video page: {0}")]
    Fetch(#[from] FetchError),

    /// The page did not contain an aid for the requested BV
    #[error("Video {0} did not resolve to an object id")]
    ObjectIdNotFound(String),
}

/// Unified error type for the pinglun crate
#[derive(Error, Debug)]
pub enum Error {
    /// Remote comment API errors
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Video resolution errors
    #[error("Resolve error: {0}")]
    Resolve(#[from] ResolveError),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[source] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV export errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Authentication/authorization errors
    #[error("Auth error: {0}")]
    Auth(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err)
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: err.to_string(),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
