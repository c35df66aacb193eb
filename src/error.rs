//! Error types for frame store operations

use thiserror::Error;

/// Main error type for frame store operations
#[derive(Error, Debug)]
pub enum FrameStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Invalid grid: {0}")]
    InvalidGrid(String),

    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Invalid dimensions: {0}")]
    InvalidDimensions(String),

    #[error("Unsupported trace format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Storage backend error: {0}")]
    StorageBackend(String),

    #[error("Not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Frame store is already closed")]
    Closed,
}

/// Coarse failure category, used by callers deciding whether to retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or missing dataset metadata, bad grid parameters or ranges
    Config,
    /// Object contents disagree with the declared record layout
    Format,
    /// Connectivity or IO failure talking to the blob store
    Storage,
    /// Operation on a closed session
    Closed,
}

impl FrameStoreError {
    /// Map this error onto the coarse taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            FrameStoreError::Configuration(_)
            | FrameStoreError::Metadata(_)
            | FrameStoreError::InvalidGrid(_)
            | FrameStoreError::InvalidRange(_)
            | FrameStoreError::InvalidDimensions(_)
            | FrameStoreError::UnsupportedFormat(_)
            | FrameStoreError::AlreadyExists(_)
            | FrameStoreError::Serialization(_)
            | FrameStoreError::InvalidUrl(_) => ErrorKind::Config,
            FrameStoreError::InvalidFormat(_) => ErrorKind::Format,
            FrameStoreError::Io(_)
            | FrameStoreError::StorageBackend(_)
            | FrameStoreError::NotFound { .. } => ErrorKind::Storage,
            FrameStoreError::Closed => ErrorKind::Closed,
        }
    }

    pub(crate) fn not_found(bucket: &str, key: &str) -> Self {
        FrameStoreError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }
}

/// Specialized Result type for frame store operations
pub type Result<T> = std::result::Result<T, FrameStoreError>;

impl From<serde_json::Error> for FrameStoreError {
    fn from(err: serde_json::Error) -> Self {
        FrameStoreError::Serialization(err.to_string())
    }
}
