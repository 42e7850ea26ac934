use std::path::PathBuf;

use thiserror::Error;

/// Operational classification of a failure.
///
/// - Resolution: no destination could be computed; never enqueued.
/// - Transient: a delivery attempt failed; the queue retries it.
/// - LocalIo: the artifact on disk is missing or unreadable.
/// - Config: settings rejected at build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Resolution,
    Transient,
    LocalIo,
    Config,
}

#[derive(Debug, Error)]
pub enum CourierError {
    #[error("no destination configured for {0}")]
    NoDestinationConfigured(&'static str),

    #[error("artifact not found: {}", .0.display())]
    ArtifactMissing(PathBuf),

    #[error("object storage: {0}")]
    Storage(#[from] object_store::Error),

    #[error("webhook request: {0}")]
    Http(#[from] reqwest::Error),

    #[error("webhook responded with HTTP {0}")]
    HttpStatus(reqwest::StatusCode),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl CourierError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CourierError::NoDestinationConfigured(_) => ErrorKind::Resolution,
            CourierError::ArtifactMissing(_) | CourierError::Io(_) => ErrorKind::LocalIo,
            CourierError::Config(_) => ErrorKind::Config,
            CourierError::Storage(_)
            | CourierError::Http(_)
            | CourierError::HttpStatus(_)
            | CourierError::Other(_) => ErrorKind::Transient,
        }
    }
}
