//! Error types for scribe

use thiserror::Error;

/// Result type alias for scribe operations
pub type Result<T> = std::result::Result<T, ScribeError>;

/// Main error type for scribe
///
/// Collaborator calls fail with `Storage`, `Transcription` or `Detection`;
/// result documents that cannot be read or written fail with `Parse` or
/// `Serialization`.
#[derive(Error, Debug)]
pub enum ScribeError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Transcription service error: {0}")]
    Transcription(String),

    #[error("PII detection error: {0}")]
    Detection(String),

    #[error("Parse error: {0}")]
    Parse(String),
}
