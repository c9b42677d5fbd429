//! # Error Types
//!
//! Errors reported by a coordination client.

use crate::SessionId;
use thiserror::Error;

/// Error conditions a coordination-service round-trip can end in.
///
/// The variants mirror the result codes of a ZooKeeper-like service. The
/// connection-level variants ([`CoordinationError::ConnectionLoss`] and
/// [`CoordinationError::SessionExpired`]) are fatal to whatever recipe is
/// running on the session; the node-level variants describe the tree and are
/// often expected (a node vanishing between two reads, for instance).
///
/// # Examples
///
/// ```rust
/// use herald_core::CoordinationError;
///
/// let error = CoordinationError::connection_loss("service unreachable");
/// assert!(error.is_connection_loss());
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinationError {
    /// The service could not be reached
    #[error("Connection to coordination service lost: {message}")]
    ConnectionLoss { message: String },

    /// The session ended; its ephemeral nodes are gone
    #[error("Session {session} expired")]
    SessionExpired { session: SessionId },

    /// The node (or the parent of a node being created) does not exist
    #[error("Node {path} does not exist")]
    NoNode { path: String },

    /// A non-sequential create hit an existing node
    #[error("Node {path} already exists")]
    NodeExists { path: String },

    /// Delete of a node that still has children
    #[error("Node {path} has children")]
    NotEmpty { path: String },

    /// Create under an ephemeral parent
    #[error("Ephemeral node {path} cannot have children")]
    NoChildrenForEphemerals { path: String },

    /// Malformed node path
    #[error("Invalid path {path}: {reason}")]
    InvalidPath { path: String, reason: String },

    /// Unexpected internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Result alias for coordination round-trips.
pub type Result<T> = std::result::Result<T, CoordinationError>;

impl CoordinationError {
    /// Creates a connection-loss error with the given message.
    pub fn connection_loss(message: impl Into<String>) -> Self {
        Self::ConnectionLoss {
            message: message.into(),
        }
    }

    pub fn no_node(path: impl Into<String>) -> Self {
        Self::NoNode { path: path.into() }
    }

    pub fn node_exists(path: impl Into<String>) -> Self {
        Self::NodeExists { path: path.into() }
    }

    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// True when the session can no longer be used.
    ///
    /// Recipes treat these as fatal and surface them to their caller instead
    /// of retrying.
    pub fn is_connection_loss(&self) -> bool {
        matches!(
            self,
            Self::ConnectionLoss { .. } | Self::SessionExpired { .. }
        )
    }
}
