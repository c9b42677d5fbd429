//! Error types for leader election.

use herald_core::CoordinationError;
use thiserror::Error;

/// Result type for election operations
pub type ElectionResult<T> = Result<T, ElectionError>;

/// Errors that can end or interrupt a candidacy
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ElectionError {
    /// The session could not reach the service; fatal to the candidacy
    #[error("Coordination service unavailable: {source}")]
    CoordinationUnavailable { source: CoordinationError },

    /// The election namespace has not been created
    #[error("Election namespace {namespace} does not exist")]
    NamespaceMissing { namespace: String },

    /// Our own participant node is no longer in the namespace
    #[error("Participant {node} is missing from the election")]
    ParticipantMissing { node: String },

    /// `evaluate` was called before `volunteer`
    #[error("Not volunteered for leadership")]
    NotVolunteered,

    /// The predecessor kept vanishing before a watch could be armed on a live one
    #[error("Gave up re-evaluating after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    /// Any other coordination failure
    #[error("Coordination error: {source}")]
    Coordination { source: CoordinationError },
}

impl ElectionError {
    /// Classify a coordination failure seen while working in `namespace`.
    pub fn from_coordination(error: CoordinationError, namespace: &str) -> Self {
        match error {
            e if e.is_connection_loss() => ElectionError::CoordinationUnavailable { source: e },
            CoordinationError::NoNode { path } if is_within(&path, namespace) => {
                ElectionError::NamespaceMissing {
                    namespace: namespace.to_string(),
                }
            }
            e => ElectionError::Coordination { source: e },
        }
    }

    /// True when the candidacy cannot continue on this session.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ElectionError::CoordinationUnavailable { .. } | ElectionError::ParticipantMissing { .. }
        )
    }
}

/// `path` is `namespace` itself or lies below it.
fn is_within(path: &str, namespace: &str) -> bool {
    path.strip_prefix(namespace)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}
