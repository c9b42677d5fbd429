//! Error types for the service registry.

use herald_core::CoordinationError;
use thiserror::Error;

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors that can occur while publishing or reading membership
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A coordination round-trip failed
    #[error("Coordination error: {source}")]
    Coordination {
        #[from]
        source: CoordinationError,
    },

    /// Metadata that cannot be published
    #[error("Invalid metadata: {reason}")]
    InvalidMetadata { reason: String },
}

impl RegistryError {
    /// True when the failure came from losing the session.
    pub fn is_connection_loss(&self) -> bool {
        matches!(self, RegistryError::Coordination { source } if source.is_connection_loss())
    }
}
