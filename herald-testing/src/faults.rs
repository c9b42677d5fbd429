//! Fault-injecting client wrappers.

use async_trait::async_trait;
use bytes::Bytes;
use herald_coordinator::{InMemoryCoordinator, InMemorySession};
use herald_core::{
    ConnectionState, CoordinationClient, CreateMode, NodeStat, Result, SessionId, Watcher,
};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tracing::debug;

/// Session whose watched `exists` calls find the node already gone.
///
/// For the first `races` calls to `exists` that carry a watcher, the target
/// node is deleted out of band just before the call reaches the service. This
/// reproduces a predecessor disappearing between the listing and the watch.
pub struct VanishingPredecessorClient {
    inner: InMemorySession,
    coordinator: InMemoryCoordinator,
    remaining: AtomicU32,
    vanished: AtomicU32,
}

impl VanishingPredecessorClient {
    pub fn new(coordinator: &InMemoryCoordinator, races: u32) -> Self {
        Self {
            inner: coordinator.connect(None),
            coordinator: coordinator.clone(),
            remaining: AtomicU32::new(races),
            vanished: AtomicU32::new(0),
        }
    }

    /// Number of nodes deleted so far.
    pub fn vanished(&self) -> u32 {
        self.vanished.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CoordinationClient for VanishingPredecessorClient {
    fn session_id(&self) -> SessionId {
        self.inner.session_id()
    }

    fn connection_state(&self) -> ConnectionState {
        self.inner.connection_state()
    }

    async fn create(
        &self,
        path: &str,
        data: Bytes,
        mode: CreateMode,
        sequential: bool,
    ) -> Result<String> {
        self.inner.create(path, data, mode, sequential).await
    }

    async fn exists(&self, path: &str, watcher: Option<Watcher>) -> Result<Option<NodeStat>> {
        let race = watcher.is_some()
            && self
                .remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
        if race {
            match self.coordinator.delete_node(path) {
                Ok(()) => {
                    self.vanished.fetch_add(1, Ordering::SeqCst);
                    debug!("Deleted {} ahead of the watch", path);
                }
                Err(e) => debug!("Could not delete {} ahead of the watch: {}", path, e),
            }
        }
        self.inner.exists(path, watcher).await
    }

    async fn get_children(&self, path: &str, watcher: Option<Watcher>) -> Result<Vec<String>> {
        self.inner.get_children(path, watcher).await
    }

    async fn get_data(&self, path: &str) -> Result<(Bytes, NodeStat)> {
        self.inner.get_data(path).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.inner.delete(path).await
    }

    async fn close(&self) -> Result<()> {
        self.inner.close().await
    }
}

/// Read at which [`VanishingEntryClient`] removes its target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VanishAt {
    /// Right before the presence check
    Exists,
    /// After the presence check, right before the payload read
    GetData,
}

/// Session that deletes one node the first time it reads it.
///
/// Reproduces an entry leaving between a children listing and the reads that
/// follow it.
pub struct VanishingEntryClient {
    inner: InMemorySession,
    coordinator: InMemoryCoordinator,
    target: String,
    at: VanishAt,
    armed: AtomicBool,
}

impl VanishingEntryClient {
    pub fn new(coordinator: &InMemoryCoordinator, target: impl Into<String>, at: VanishAt) -> Self {
        Self {
            inner: coordinator.connect(None),
            coordinator: coordinator.clone(),
            target: target.into(),
            at,
            armed: AtomicBool::new(true),
        }
    }

    /// Whether the target has been deleted.
    pub fn vanished(&self) -> bool {
        !self.armed.load(Ordering::SeqCst)
    }

    fn vanish(&self, path: &str, at: VanishAt) {
        if at != self.at || path != self.target || !self.armed.swap(false, Ordering::SeqCst) {
            return;
        }
        match self.coordinator.delete_node(path) {
            Ok(()) => debug!("Deleted {} ahead of the read", path),
            Err(e) => debug!("Could not delete {} ahead of the read: {}", path, e),
        }
    }
}

#[async_trait]
impl CoordinationClient for VanishingEntryClient {
    fn session_id(&self) -> SessionId {
        self.inner.session_id()
    }

    fn connection_state(&self) -> ConnectionState {
        self.inner.connection_state()
    }

    async fn create(
        &self,
        path: &str,
        data: Bytes,
        mode: CreateMode,
        sequential: bool,
    ) -> Result<String> {
        self.inner.create(path, data, mode, sequential).await
    }

    async fn exists(&self, path: &str, watcher: Option<Watcher>) -> Result<Option<NodeStat>> {
        self.vanish(path, VanishAt::Exists);
        self.inner.exists(path, watcher).await
    }

    async fn get_children(&self, path: &str, watcher: Option<Watcher>) -> Result<Vec<String>> {
        self.inner.get_children(path, watcher).await
    }

    async fn get_data(&self, path: &str) -> Result<(Bytes, NodeStat)> {
        self.vanish(path, VanishAt::GetData);
        self.inner.get_data(path).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.inner.delete(path).await
    }

    async fn close(&self) -> Result<()> {
        self.inner.close().await
    }
}
