use thiserror::Error;

/// Main error type for quarry operations
#[derive(Error, Debug)]
pub enum QuarryError {
    #[error("Store busy: {store} writer is held by another handle")]
    TransientStoreBusy { store: String },

    #[error("Content filter error: {0}")]
    ContentFilter(String),

    #[error("Schema version mismatch: found {found}, expected {expected}")]
    SchemaVersionMismatch { expected: String, found: String },

    #[error("Dangling write lock: {0}")]
    CorruptOrDanglingLock(String),

    #[error("Too many clauses: {count} exceeds limit of {max}")]
    TooManyClauses { count: usize, max: usize },

    #[error("Field too large: {field} is {size} bytes")]
    FieldTooLarge { field: String, size: usize },

    #[error("Corrupt store: {0}")]
    CorruptStore(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for quarry operations
pub type Result<T> = std::result::Result<T, QuarryError>;

impl QuarryError {
    /// Check if this error indicates a transient failure that could be retried
    pub fn is_retriable(&self) -> bool {
        matches!(self, QuarryError::TransientStoreBusy { .. })
    }

    /// Check if this error means the on-disk index should be purged and rebuilt
    pub fn forces_rebuild(&self) -> bool {
        matches!(
            self,
            QuarryError::SchemaVersionMismatch { .. }
                | QuarryError::CorruptOrDanglingLock(_)
                | QuarryError::CorruptStore(_)
        )
    }

    /// Errors a single item write can recover from by retrying without content
    pub fn is_item_local(&self) -> bool {
        matches!(
            self,
            QuarryError::FieldTooLarge { .. } | QuarryError::ContentFilter(_)
        )
    }
}
