//! Error types for the sync layer.

use crate::config::ConfigError;

/// Failures reported by a remote document channel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("remote unavailable: {0}")]
    Unavailable(String),

    #[error("write rejected: {0}")]
    Rejected(String),

    #[error("malformed document: {0}")]
    Malformed(String),

    #[error("document channel closed")]
    ChannelClosed,
}

impl From<tandem_engine::Error> for RemoteError {
    fn from(err: tandem_engine::Error) -> Self {
        RemoteError::Malformed(err.to_string())
    }
}

/// Service-level errors.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("sync service has stopped")]
    ServiceStopped,

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for service calls.
pub type Result<T> = std::result::Result<T, SyncError>;
