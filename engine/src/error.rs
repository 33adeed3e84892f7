//! Error types for the Tandem engine.

use thiserror::Error;

/// All possible errors from the Tandem engine.
///
/// Runtime failures inside the [`Store`](crate::Store) are never returned to
/// callers; they are recorded in [`StoreState::error`](crate::StoreState).
/// These variants surface only from decoding and cache plumbing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Local cache errors
    #[error("local cache error: {0}")]
    Cache(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    // Decoding errors
    #[error("invalid payload for {action}: {reason}")]
    InvalidPayload { action: String, reason: String },

    #[error("invalid profile document: {0}")]
    InvalidDocument(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
