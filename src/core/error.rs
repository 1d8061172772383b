use thiserror::Error;

/// Core error type for the palin retry engine.
///
/// This error type uses `thiserror` with proper `#[source]` annotations
/// to preserve error chains for debugging and error handling.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CoreError {
    /// Serialization failed when encoding a value to bytes.
    #[error("serialization failed")]
    Serialization(#[source] serde_json::Error),

    /// Deserialization failed when decoding bytes to a value.
    #[error("deserialization failed")]
    Deserialization(#[source] serde_json::Error),

    /// A hash string was not 64 hexadecimal characters.
    #[error("invalid secure hash: {0}")]
    InvalidHash(String),

    /// A state reference string was not of the form `<hash>(<index>)`.
    #[error("invalid state reference: {0}")]
    InvalidStateRef(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
