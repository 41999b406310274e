//! Error types for WikiDigest.
//!
//! Library crates use [`WikiDigestError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

use serde::Serialize;

/// Top-level error type for all WikiDigest operations.
#[derive(Debug, thiserror::Error)]
pub enum WikiDigestError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Non-success HTTP status or transport error while fetching a page.
    #[error("fetch failed for {url}: {message}")]
    Fetch { url: String, message: String },

    /// The fetched page did not have the expected structure.
    #[error("parse failed for {url}: {message}")]
    Parse { url: String, message: String },

    /// Summary generation failed (transport, upstream status, or malformed response).
    #[error("summarization error: {0}")]
    Summarization(String),

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// No document exists for the requested URL.
    #[error("document not found: {url}")]
    NotFound { url: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Input validation error (malformed URL and the like).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// HTTP listener could not be bound or stopped with an error.
    #[error("server error: {0}")]
    Server(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, WikiDigestError>;

/// Coarse failure category recorded for an aborted crawl branch or summary step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Fetch,
    Parse,
    Storage,
    Summarization,
    Other,
}

impl WikiDigestError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a fetch error for `url`.
    pub fn fetch(url: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Fetch {
            url: url.into(),
            message: msg.into(),
        }
    }

    /// Create a parse error for `url`.
    pub fn parse(url: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Parse {
            url: url.into(),
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The failure category this error is reported under.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Fetch { .. } => FailureKind::Fetch,
            Self::Parse { .. } => FailureKind::Parse,
            Self::Storage(_) => FailureKind::Storage,
            Self::Summarization(_) => FailureKind::Summarization,
            _ => FailureKind::Other,
        }
    }
}
