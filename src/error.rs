//! Error types for album-mirror
//!
//! Failures are contained at the smallest meaningful unit (one item, one
//! page, one album, one collection). Only authentication and configuration
//! errors are allowed to terminate an orchestrated run; everything else is
//! logged, counted, and skipped.

use thiserror::Error;

/// Result type alias for album-mirror operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for album-mirror
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid credential context — fatal to the run
    #[error("authentication error: {0}")]
    Authentication(String),

    /// Remote catalog service returned a failure for an album or page
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Network-level failure (timeout, connection refused, transfer abort)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Filesystem failure (write, rename, permission)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error (index record, API payload)
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable description of the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "collections")
        key: Option<String>,
    },

    /// Schedule expression rejected at `start()` time
    #[error("invalid schedule expression: {0}")]
    InvalidSchedule(String),

    /// Retry budget spent on a single asset transfer
    #[error("download failed after {attempts} attempts: {url}")]
    DownloadExhausted {
        /// The asset URL that could not be fetched
        url: String,
        /// Total attempts made (initial try plus retries)
        attempts: u32,
    },
}

/// Failures reported by the remote catalog service
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The authenticated account may not view this collection
    #[error("permission denied for collection {collection_id}")]
    PermissionDenied {
        /// The collection that rejected the request
        collection_id: String,
    },

    /// Non-zero status code in an otherwise well-formed response
    #[error("catalog API returned code {code}: {message}")]
    Status {
        /// The service's status code
        code: i64,
        /// The service's message, if any
        message: String,
    },

    /// Response body could not be interpreted
    #[error("malformed catalog response: {0}")]
    Malformed(String),
}

impl Error {
    /// Build a configuration error for the given key
    pub fn config(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}
