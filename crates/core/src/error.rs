//! Error types for bag storage
//!
//! This module defines the error type returned by every storage operation.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use std::io;
use thiserror::Error;

/// Result type alias for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Error types for bag storage
#[derive(Debug, Error)]
pub enum StorageError {
    /// A type name is not of the form `pkg/Type` or `pkg/msg/Type`
    #[error("Invalid package resource name: {0}")]
    InvalidIdentifier(String),

    /// A message definition (or one of its dependencies) could not be located
    #[error("Definition not found: {0}")]
    DefinitionNotFound(String),

    /// A package is not installed in any known prefix
    #[error("Package not found: {0}")]
    PackageNotFound(String),

    /// Input violated an internal invariant (unknown format tag, bad pattern)
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// A message was written to a topic that was never created
    #[error("Unknown message topic \"{0}\"")]
    UnknownTopic(String),

    /// A created topic has no registered channel
    #[error("Channel reference not found for topic: \"{0}\"")]
    ChannelMissing(String),

    /// The container rejected a message write
    #[error("Failed to write {bytes} byte message to MCAP file: {reason}")]
    WriteFailed {
        /// Size of the payload that failed to write
        bytes: usize,
        /// Reason reported by the container library
        reason: String,
    },

    /// Forcing written data to disk failed
    #[error("Sync failed: {0}")]
    SyncFailed(String),

    /// `read_next` was called with no message available
    #[error("No next message is available")]
    NoMessageAvailable,

    /// A channel references a schema that is not in the container
    #[error("Could not find schema {schema_id} for topic {topic}")]
    SchemaMissing {
        /// Topic of the offending channel
        topic: String,
        /// Schema id the channel references
        schema_id: u16,
    },

    /// The requested operation or mode is not implemented
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// The container library failed to read or decode the file
    #[error("Container error: {0}")]
    Container(String),

    /// Storage configuration could not be read or is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// The operation does not apply to the storage's current open mode
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// I/O error (file operations)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StorageError {
    /// Create a write failure for a payload of `bytes` bytes.
    pub fn write_failed(bytes: usize, reason: impl Into<String>) -> Self {
        StorageError::WriteFailed {
            bytes,
            reason: reason.into(),
        }
    }

    /// Create an invalid-state error.
    pub fn invalid_state(detail: impl Into<String>) -> Self {
        StorageError::InvalidState(detail.into())
    }

    /// Whether this error reports a missing message definition.
    pub fn is_definition_not_found(&self) -> bool {
        matches!(self, StorageError::DefinitionNotFound(_))
    }
}
