//! The coordination-service surface consumed by the recipes.

use crate::{ConnectionState, CreateMode, NodeStat, Result, SessionId, WatchEvent};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Receiver of fired watches.
///
/// A handler is passed along with the read that arms the watch and is invoked
/// at most once per registration. All handlers of one session run on that
/// session's single dispatcher, one at a time, so a handler never races another
/// handler of the same client. It may race application tasks calling into the
/// same component.
#[async_trait]
pub trait WatchHandler: Send + Sync {
    async fn handle(self: Arc<Self>, event: WatchEvent);
}

/// Shared handle to a watch handler.
pub type Watcher = Arc<dyn WatchHandler>;

/// Session-oriented client to a hierarchical coordination service.
///
/// Every method is one round-trip and resolves when the service has answered.
/// Implementations own the network session; ephemeral nodes created through a
/// client live exactly as long as its session.
#[async_trait]
pub trait CoordinationClient: Send + Sync {
    /// The session this client speaks for.
    fn session_id(&self) -> SessionId;

    /// Last connection state observed by the client.
    fn connection_state(&self) -> ConnectionState;

    /// Create a node and return its full path.
    ///
    /// With `sequential` set the service appends a zero-padded, monotonically
    /// increasing suffix to `path`, unique under the parent.
    async fn create(
        &self,
        path: &str,
        data: Bytes,
        mode: CreateMode,
        sequential: bool,
    ) -> Result<String>;

    /// Presence of a node, optionally arming a watch on it.
    ///
    /// The watch fires on creation, deletion or data change of `path`. It is
    /// armed even when the node is absent, in which case only a creation can
    /// fire it.
    async fn exists(&self, path: &str, watcher: Option<Watcher>) -> Result<Option<NodeStat>>;

    /// Names (not paths) of a node's children, optionally arming a watch.
    ///
    /// The watch fires `NodeChildrenChanged` when a child is added or removed,
    /// or `NodeDeleted` when the node itself goes away.
    async fn get_children(&self, path: &str, watcher: Option<Watcher>) -> Result<Vec<String>>;

    /// Payload and metadata of a node.
    async fn get_data(&self, path: &str) -> Result<(Bytes, NodeStat)>;

    /// Delete a childless node.
    async fn delete(&self, path: &str) -> Result<()>;

    /// End the session. Its ephemeral nodes are removed and its watches
    /// dropped. Closing an ended session is a no-op.
    async fn close(&self) -> Result<()>;
}

/// Watch handler forwarding events into a channel.
pub struct ChannelWatcher {
    tx: mpsc::UnboundedSender<WatchEvent>,
}

#[async_trait]
impl WatchHandler for ChannelWatcher {
    async fn handle(self: Arc<Self>, event: WatchEvent) {
        // Receiver gone means nobody cares anymore.
        let _ = self.tx.send(event);
    }
}

/// A watcher plus the receiving end of its events.
pub fn channel_watcher() -> (Watcher, mpsc::UnboundedReceiver<WatchEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(ChannelWatcher { tx }), rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WatchEventKind;

    #[tokio::test]
    async fn test_channel_watcher_forwards_events() {
        let (watcher, mut rx) = channel_watcher();

        watcher
            .clone()
            .handle(WatchEvent::node(WatchEventKind::NodeDeleted, "/a"))
            .await;
        watcher
            .handle(WatchEvent::connection(ConnectionState::Closed))
            .await;

        let first = rx.recv().await.unwrap();
        assert_eq!(first.kind, WatchEventKind::NodeDeleted);
        assert!(first.is_for("/a"));

        let second = rx.recv().await.unwrap();
        assert_eq!(
            second.kind,
            WatchEventKind::ConnectionStateChanged(ConnectionState::Closed)
        );
    }
}
