//! Error types for SaferViewer

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for SaferViewer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in SaferViewer
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    #[error("OAuth error: {0}")]
    OAuth(String),

    #[error("No cached credential at {0:?}")]
    TokenNotFound(PathBuf),

    #[error("Token rejected by remote service: {0}")]
    Unauthorized(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Unable to open {target}: {reason}")]
    Open { target: String, reason: String },

    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}
