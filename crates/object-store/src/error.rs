//! Error types for the object storage backend.

/// Errors that can occur when working with object storage.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Object storage error
    #[error("object storage error: {0}")]
    ObjectStore(#[from] object_store::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Keys must be lowercase hex content digests
    #[error("invalid object key: {0}")]
    InvalidKey(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// S3 bucket not found - must be created before use
    #[error("S3 bucket '{0}' does not exist. Create it before use.")]
    BucketNotFound(String),
}

impl StoreError {
    /// Whether the failure is about the backend rather than the request.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::ObjectStore(_) | StoreError::Io(_))
    }
}

/// Result type alias for object storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;
