//! Definition lookup errors.

use mcapbag_core::StorageError;
use std::io;

/// Result type alias for definition operations
pub type DefinitionResult<T> = std::result::Result<T, DefinitionError>;

/// Errors raised while locating, parsing or assembling message definitions.
#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    /// The name is not of the form `pkg/Type` or `pkg/msg/Type`.
    #[error("Invalid package resource name: {0}")]
    InvalidIdentifier(String),

    /// No definition text exists for the named type.
    ///
    /// Carries the name of the missing type, which may be a transitive
    /// dependency rather than the type that was asked for.
    #[error("{0}")]
    DefinitionNotFound(String),

    /// The package is not installed under any known prefix.
    #[error("Package not found: {0}")]
    PackageNotFound(String),

    /// Unrecognized definition format tag.
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Reading a definition file failed for a reason other than absence.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl DefinitionError {
    /// Name of the missing type, if this error reports one.
    pub fn missing_definition(&self) -> Option<&str> {
        match self {
            DefinitionError::DefinitionNotFound(name) => Some(name),
            _ => None,
        }
    }
}

impl From<DefinitionError> for StorageError {
    fn from(err: DefinitionError) -> Self {
        match err {
            DefinitionError::InvalidIdentifier(name) => StorageError::InvalidIdentifier(name),
            DefinitionError::DefinitionNotFound(name) => StorageError::DefinitionNotFound(name),
            DefinitionError::PackageNotFound(name) => StorageError::PackageNotFound(name),
            DefinitionError::MalformedInput(detail) => StorageError::MalformedInput(detail),
            DefinitionError::Io(e) => StorageError::Io(e),
        }
    }
}
