use std::io;

use thiserror::Error;

/// Why a download (or one of its fetch tasks) stopped.
///
/// Only the coordinator turns one of these into a sink-visible `failed` call;
/// `Cancelled` never leaves the coordinator.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("connection to {url} failed: {source}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected response from {url}: {reason}")]
    Protocol { url: String, reason: String },

    #[error("read failed: {0}")]
    Io(#[from] io::Error),

    #[error("handler rejected event: {0}")]
    Sink(#[source] io::Error),

    #[error("fetch cancelled after a sibling segment failed")]
    Cancelled,

    #[error("fetch task aborted: {0}")]
    TaskAborted(String),
}

impl DownloadError {
    pub(crate) fn protocol(url: &str, reason: impl Into<String>) -> Self {
        DownloadError::Protocol {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    /// Maps an error raised while the body is being read. reqwest reports body
    /// failures through the same error type as connect failures.
    pub(crate) fn from_body(err: reqwest::Error) -> Self {
        DownloadError::Io(io::Error::other(err))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DownloadError::Cancelled)
    }
}

impl From<tokio::task::JoinError> for DownloadError {
    fn from(err: tokio::task::JoinError) -> Self {
        DownloadError::TaskAborted(err.to_string())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("buffer size must be greater than zero")]
    ZeroBufferSize,

    #[error("invalid proxy address {0:?}, expected host:port")]
    InvalidProxy(String),
}

#[derive(Debug, Error)]
pub enum SystemError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to start worker pool: {0}")]
    Runtime(#[from] io::Error),
}
