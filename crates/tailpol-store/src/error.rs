/// Errors from document store and persistence operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The document (or a collection) could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The in-memory mutation was committed but writing it to the backend
    /// failed. The in-memory value stands.
    #[error("persistence to {backend} failed: {source}")]
    Persistence {
        backend: String,
        #[source]
        source: Box<StoreError>,
    },

    /// The storage location descriptor is malformed or uses an unknown scheme.
    #[error("invalid storage descriptor {descriptor:?}: {reason}")]
    Descriptor { descriptor: String, reason: String },

    /// A backend-specific failure (object store client, remote service).
    #[error("backend error: {0}")]
    Backend(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A thread panicked while holding the document lock.
    #[error("document lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    pub(crate) fn descriptor(descriptor: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Descriptor {
            descriptor: descriptor.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` when the error only reports a failed backend write
    /// for a mutation that has already been applied in memory.
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence { .. })
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
