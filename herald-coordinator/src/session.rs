//! Client sessions on the in-memory service.

use crate::coordinator::Shared;
use async_trait::async_trait;
use bytes::Bytes;
use herald_core::{
    ConnectionState, CoordinationClient, CreateMode, NodeStat, Result, SessionId, Watcher,
};
use std::sync::Arc;
use tracing::debug;

/// A session opened by [`InMemoryCoordinator::connect`](crate::InMemoryCoordinator::connect).
///
/// Every operation yields to the scheduler before touching the tree so that
/// concurrent callers interleave the way they would against a remote service.
/// The session check runs under the tree lock, so nothing lands in the tree
/// after the session ended.
#[derive(Clone)]
pub struct InMemorySession {
    id: SessionId,
    shared: Arc<Shared>,
}

impl InMemorySession {
    pub(crate) fn new(id: SessionId, shared: Arc<Shared>) -> Self {
        Self { id, shared }
    }
}

#[async_trait]
impl CoordinationClient for InMemorySession {
    fn session_id(&self) -> SessionId {
        self.id
    }

    fn connection_state(&self) -> ConnectionState {
        self.shared.state_of(self.id)
    }

    async fn create(
        &self,
        path: &str,
        data: Bytes,
        mode: CreateMode,
        sequential: bool,
    ) -> Result<String> {
        tokio::task::yield_now().await;
        let mut tree = self.shared.tree.lock();
        self.shared.check(self.id)?;

        let mut fired = Vec::new();
        let created = tree.create(self.id, path, data, mode, sequential, &mut fired)?;
        self.shared.dispatch(fired);

        debug!("Session {} created {} ({})", self.id, created, mode);
        Ok(created)
    }

    async fn exists(&self, path: &str, watcher: Option<Watcher>) -> Result<Option<NodeStat>> {
        tokio::task::yield_now().await;
        let mut tree = self.shared.tree.lock();
        self.shared.check(self.id)?;
        tree.exists(self.id, path, watcher)
    }

    async fn get_children(&self, path: &str, watcher: Option<Watcher>) -> Result<Vec<String>> {
        tokio::task::yield_now().await;
        let mut tree = self.shared.tree.lock();
        self.shared.check(self.id)?;
        tree.children(self.id, path, watcher)
    }

    async fn get_data(&self, path: &str) -> Result<(Bytes, NodeStat)> {
        tokio::task::yield_now().await;
        let tree = self.shared.tree.lock();
        self.shared.check(self.id)?;
        tree.data(path)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        tokio::task::yield_now().await;
        let mut tree = self.shared.tree.lock();
        self.shared.check(self.id)?;

        let mut fired = Vec::new();
        tree.delete(path, &mut fired)?;
        self.shared.dispatch(fired);

        debug!("Session {} deleted {}", self.id, path);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if !self.shared.end_session(self.id, ConnectionState::Closed) {
            debug!("Session {} already ended", self.id);
        }
        Ok(())
    }
}
