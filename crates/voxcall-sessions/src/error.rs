//! Error types for the session registry.

/// Errors that can occur during session registry operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No session exists for the call identifier.
    #[error("call session not found: {0}")]
    NotFound(String),

    /// The call identifier was empty.
    #[error("call identifier must not be empty")]
    EmptyCallSid,

    /// The stored transcript for a call could not be decoded.
    #[error("corrupt transcript for call {call_sid}: {source}")]
    CorruptTranscript {
        call_sid: String,
        source: serde_json::Error,
    },

    /// A database operation failed.
    #[error("session database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON serialization failed.
    #[error("session serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
