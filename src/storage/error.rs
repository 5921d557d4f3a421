//! Storage error taxonomy.

use super::document::StoreError;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StorageError {
    /// Empty, multi-aggregate or non-contiguous commit. A caller bug.
    #[error("Invalid commit: {0}")]
    InvalidCommit(String),

    #[error("Cannot deserialize payload of type {payload_type}: {reason}")]
    Deserialization {
        payload_type: String,
        reason: String,
    },

    /// Another commit already occupies this position of the stream.
    #[error(
        "Commit conflict: {aggregate_type}/{aggregate_id} already has a commit at sequence {first_sequence}"
    )]
    CommitConflict {
        aggregate_type: String,
        aggregate_id: String,
        first_sequence: u64,
    },

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Invalid criteria: {0}")]
    InvalidCriteria(String),

    #[error("Failed to provision index {index}: {reason}")]
    IndexProvisioning { index: String, reason: String },

    #[error("Cannot serialize payload: {0}")]
    Serialization(String),

    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    #[error("Store error: {0}")]
    Backend(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl StorageError {
    /// Whether a caller may retry the same operation later.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::StorageUnavailable(_))
    }
}

/// Translation for store errors that carry no write context. Duplicate keys
/// on commits are translated by the event store, which knows the commit.
impl From<StoreError> for StorageError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable(reason) => StorageError::StorageUnavailable(reason),
            StoreError::IndexConflict { index, reason } => {
                StorageError::IndexProvisioning { index, reason }
            }
            StoreError::DuplicateKey { .. } | StoreError::Backend(_) => {
                StorageError::Backend(e.to_string())
            }
        }
    }
}
