//! Storage error types.

/// Errors from storage operations.
///
/// `NotFound` is the only variant the layers above match on; everything
/// else is backend failure reported with the failing key or prefix.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The key does not exist, or a delete matched zero rows.
    #[error("key not found")]
    NotFound,

    /// Failed to read a key.
    #[error("failed to read key '{key}': {reason}")]
    Read { key: String, reason: String },

    /// Failed to write a key (including lease grant failures).
    #[error("failed to write key '{key}': {reason}")]
    Write { key: String, reason: String },

    /// Failed to delete a key or prefix.
    #[error("failed to delete key '{key}': {reason}")]
    Delete { key: String, reason: String },

    /// Failed to list or count keys under a prefix.
    #[error("failed to list prefix '{prefix}': {reason}")]
    List { prefix: String, reason: String },

    /// The backend cannot be reached.
    #[error("storage backend unavailable: {reason}")]
    Unavailable { reason: String },

    /// A session or election operation failed.
    #[error("election failed on '{key}': {reason}")]
    Election { key: String, reason: String },
}

impl StorageError {
    /// Whether this error is the not-found sentinel.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}
