use core::result::Result as CoreResult;
use std::io::Error as IoError;

use reqwest::Error as ReqwestError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;
use toml::de::Error as TomlError;

/// Result type for harbor operations.
pub type Result<T> = CoreResult<T, Error>;

/// Errors that can occur while driving a run.
///
/// Runners never hand these to their callers: every error is folded into a
/// failed `TestResult` whose `error` field carries the display string.
#[derive(Debug, Error)]
pub enum Error {
    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// An HTTP request failed before a response arrived.
    #[error("{0}")]
    Request(#[from] ReqwestError),

    /// JSON serialization or deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] SerdeJsonError),

    /// TOML deserialization failed.
    #[error("TOML deserialization error: {0}")]
    Toml(#[from] TomlError),

    /// A required credential or field is missing.
    #[error("{0}")]
    Config(String),

    /// A call was cancelled by its timer.
    #[error("Request timed out after {0}ms")]
    Timeout(u64),

    /// The remote platform answered with a non-success status.
    #[error("{message}")]
    Remote {
        /// HTTP status returned by the platform.
        status: u16,
        /// Human-readable message including any platform hint.
        message: String,
    },

    /// The remote response did not match any known shape.
    #[error("Unexpected response shape: {0}")]
    Shape(String),

    /// A general error not covered by other variants.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Returns `true` when the error came from a call exceeding its timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Request(error) => error.is_timeout(),
            _ => false,
        }
    }
}
