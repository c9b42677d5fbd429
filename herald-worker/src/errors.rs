//! Error types for the worker node.

use herald_core::CoordinationError;
use herald_election::ElectionError;
use herald_registry::RegistryError;
use thiserror::Error;

/// Result type for worker operations
pub type WorkerResult<T> = Result<T, WorkerError>;

/// Errors that can occur while running a cluster node
#[derive(Error, Debug)]
pub enum WorkerError {
    /// The HTTP listener could not be bound
    #[error("Failed to bind worker server on {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error(transparent)]
    Election(#[from] ElectionError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Coordination(#[from] CoordinationError),
}
