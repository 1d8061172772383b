use crate::core::CoreError;
use thiserror::Error;
use uuid::Uuid;

/// Storage layer error type for checkpoint backends.
///
/// This error type wraps underlying storage and serialization errors
/// while preserving the full error chain for debugging.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// A core serialization or deserialization error occurred.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// The checkpoint's stored flow id does not match the key it was stored under.
    #[error("checkpoint mismatch: stored under {key}, contains {found}")]
    Mismatch { key: Uuid, found: Uuid },

    /// The backend itself failed.
    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;
