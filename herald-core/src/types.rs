//! # Core Types
//!
//! Node metadata, persistence classes and the tagged watch event shared by every
//! component talking to the coordination service.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Identifier of a coordination-service session.
///
/// Ephemeral nodes are owned by the session that created them and disappear
/// when it ends.
///
/// # Examples
///
/// ```rust
/// use herald_core::SessionId;
///
/// let session = SessionId::new();
/// assert_ne!(session, SessionId::new());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Persistence class of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CreateMode {
    /// Survives the creating session
    Persistent,
    /// Removed when the creating session ends
    Ephemeral,
}

impl CreateMode {
    pub fn is_ephemeral(&self) -> bool {
        matches!(self, CreateMode::Ephemeral)
    }
}

impl fmt::Display for CreateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CreateMode::Persistent => write!(f, "PERSISTENT"),
            CreateMode::Ephemeral => write!(f, "EPHEMERAL"),
        }
    }
}

/// Metadata returned with a node's presence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStat {
    /// Incremented on every data change
    pub version: u32,
    /// Number of direct children
    pub num_children: usize,
    /// Owning session for ephemeral nodes
    pub ephemeral_owner: Option<SessionId>,
    /// Creation time, milliseconds since the epoch
    pub created_at: u64,
    /// Last modification time, milliseconds since the epoch
    pub modified_at: u64,
    /// Payload length in bytes
    pub data_length: usize,
}

/// Binary connectivity signal of a session, plus the two ways it can end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    Connected,
    /// Temporarily unable to reach the service; the session may come back
    Disconnected,
    /// The service gave up on the session
    Expired,
    /// The session was closed by its owner
    Closed,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// The session cannot come back from this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Expired | ConnectionState::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connected => write!(f, "CONNECTED"),
            ConnectionState::Disconnected => write!(f, "DISCONNECTED"),
            ConnectionState::Expired => write!(f, "EXPIRED"),
            ConnectionState::Closed => write!(f, "CLOSED"),
        }
    }
}

/// What a watch observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WatchEventKind {
    NodeCreated,
    NodeDeleted,
    NodeDataChanged,
    NodeChildrenChanged,
    ConnectionStateChanged(ConnectionState),
}

impl fmt::Display for WatchEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchEventKind::NodeCreated => write!(f, "NODE_CREATED"),
            WatchEventKind::NodeDeleted => write!(f, "NODE_DELETED"),
            WatchEventKind::NodeDataChanged => write!(f, "NODE_DATA_CHANGED"),
            WatchEventKind::NodeChildrenChanged => write!(f, "NODE_CHILDREN_CHANGED"),
            WatchEventKind::ConnectionStateChanged(state) => {
                write!(f, "CONNECTION_STATE_CHANGED({})", state)
            }
        }
    }
}

/// A fired watch: the kind of change and, for node events, the watched path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub path: Option<String>,
}

impl WatchEvent {
    pub fn node(kind: WatchEventKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: Some(path.into()),
        }
    }

    pub fn connection(state: ConnectionState) -> Self {
        Self {
            kind: WatchEventKind::ConnectionStateChanged(state),
            path: None,
        }
    }

    /// Whether this event concerns `path`.
    pub fn is_for(&self, path: &str) -> bool {
        self.path.as_deref() == Some(path)
    }
}

impl fmt::Display for WatchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{} {}", self.kind, path),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_classes() {
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Disconnected.is_connected());
        assert!(!ConnectionState::Disconnected.is_terminal());
        assert!(ConnectionState::Expired.is_terminal());
        assert!(ConnectionState::Closed.is_terminal());
    }

    #[test]
    fn test_watch_event_display_and_path() {
        let deleted = WatchEvent::node(WatchEventKind::NodeDeleted, "/election/c_0000000000");
        assert!(deleted.is_for("/election/c_0000000000"));
        assert!(!deleted.is_for("/election/c_0000000001"));
        assert_eq!(deleted.to_string(), "NODE_DELETED /election/c_0000000000");

        let lost = WatchEvent::connection(ConnectionState::Disconnected);
        assert_eq!(lost.path, None);
        assert_eq!(
            lost.to_string(),
            "CONNECTION_STATE_CHANGED(DISCONNECTED)"
        );
    }
}
