//! The in-memory coordination service and its fault-injection controls.

use crate::session::InMemorySession;
use crate::tree::{Fired, Tree};
use bytes::Bytes;
use dashmap::DashMap;
use herald_core::{
    CoordinationError, ConnectionState, NodeStat, Result, SessionId, WatchEvent, Watcher,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub(crate) type Dispatch = (Watcher, WatchEvent);

pub(crate) struct SessionHandle {
    pub state: ConnectionState,
    pub dispatch_tx: Option<mpsc::UnboundedSender<Dispatch>>,
    pub default_watcher: Option<Watcher>,
}

impl SessionHandle {
    fn notify_default(&self, state: ConnectionState) {
        if let (Some(tx), Some(watcher)) = (&self.dispatch_tx, &self.default_watcher) {
            let _ = tx.send((watcher.clone(), WatchEvent::connection(state)));
        }
    }
}

/// State shared by the coordinator and all of its sessions.
///
/// Lock order is tree first, then the session table.
pub(crate) struct Shared {
    pub tree: Mutex<Tree>,
    pub sessions: DashMap<SessionId, SessionHandle>,
    available: AtomicBool,
    events_dispatched: AtomicU64,
}

impl Shared {
    /// Hand fired watches to the dispatchers of their sessions.
    pub fn dispatch(&self, fired: Vec<Fired>) {
        for Fired {
            session,
            watcher,
            event,
        } in fired
        {
            let Some(handle) = self.sessions.get(&session) else {
                continue;
            };
            if let Some(tx) = &handle.dispatch_tx {
                debug!("Dispatching {} to session {}", event, session);
                if tx.send((watcher, event)).is_ok() {
                    self.events_dispatched.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    /// Fail unless `session` can talk to the service right now.
    pub fn check(&self, session: SessionId) -> Result<()> {
        if !self.available.load(Ordering::Acquire) {
            return Err(CoordinationError::connection_loss(
                "coordination service unavailable",
            ));
        }
        match self.sessions.get(&session).map(|handle| handle.state) {
            Some(ConnectionState::Connected) => Ok(()),
            Some(ConnectionState::Disconnected) => Err(CoordinationError::connection_loss(
                "session disconnected",
            )),
            Some(ConnectionState::Closed) => {
                Err(CoordinationError::connection_loss("session closed"))
            }
            Some(ConnectionState::Expired) | None => {
                Err(CoordinationError::SessionExpired { session })
            }
        }
    }

    pub fn state_of(&self, session: SessionId) -> ConnectionState {
        self.sessions
            .get(&session)
            .map(|handle| handle.state)
            .unwrap_or(ConnectionState::Expired)
    }

    /// End a session: drop its watches, delete its ephemerals and tell its
    /// default watcher. Returns false if it had already ended.
    pub fn end_session(&self, session: SessionId, final_state: ConnectionState) -> bool {
        let mut tree = self.tree.lock();
        {
            let Some(mut handle) = self.sessions.get_mut(&session) else {
                return false;
            };
            if handle.state.is_terminal() {
                return false;
            }
            handle.state = final_state;
        }

        let mut fired = Vec::new();
        let removed = tree.remove_session(session, &mut fired);
        self.dispatch(fired);

        if let Some(mut handle) = self.sessions.get_mut(&session) {
            handle.notify_default(final_state);
            // Dropping the sender lets the dispatcher drain and stop.
            handle.dispatch_tx = None;
        }

        info!(
            "Session {} ended ({}), removed {} ephemeral nodes",
            session, final_state, removed
        );
        true
    }
}

/// Statistics about the in-memory service
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    pub nodes: usize,
    pub live_sessions: usize,
    pub watches: usize,
    pub events_dispatched: u64,
}

/// In-process stand-in for a ZooKeeper-style ensemble.
///
/// Cloning is cheap; all clones share one tree. Sessions opened with
/// [`InMemoryCoordinator::connect`] implement
/// [`CoordinationClient`](herald_core::CoordinationClient).
#[derive(Clone)]
pub struct InMemoryCoordinator {
    shared: Arc<Shared>,
}

impl InMemoryCoordinator {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                tree: Mutex::new(Tree::new()),
                sessions: DashMap::new(),
                available: AtomicBool::new(true),
                events_dispatched: AtomicU64::new(0),
            }),
        }
    }

    /// Open a session.
    ///
    /// Spawns the session's dispatcher task, so this must run inside a tokio
    /// runtime. Connection events go to `default_watcher`, starting with the
    /// initial `Connected`.
    pub fn connect(&self, default_watcher: Option<Watcher>) -> InMemorySession {
        let id = SessionId::new();
        let (dispatch_tx, mut dispatch_rx) = mpsc::unbounded_channel::<Dispatch>();

        let tree = self.shared.tree.lock();
        let state = if self.is_available() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        };
        let handle = SessionHandle {
            state,
            dispatch_tx: Some(dispatch_tx),
            default_watcher,
        };
        handle.notify_default(state);
        self.shared.sessions.insert(id, handle);
        drop(tree);

        tokio::spawn(async move {
            while let Some((watcher, event)) = dispatch_rx.recv().await {
                watcher.handle(event).await;
            }
            debug!("Dispatcher for session {} stopped", id);
        });

        info!("Opened session {} ({})", id, state);
        InMemorySession::new(id, self.shared.clone())
    }

    /// Close a session as its owner would.
    pub fn close_session(&self, session: SessionId) -> bool {
        self.shared.end_session(session, ConnectionState::Closed)
    }

    /// Expire a session as the service would after missed heartbeats.
    pub fn expire_session(&self, session: SessionId) -> bool {
        warn!("Expiring session {}", session);
        self.shared.end_session(session, ConnectionState::Expired)
    }

    /// Make the service reachable or unreachable for every live session.
    ///
    /// While unreachable every operation fails with `ConnectionLoss`. Default
    /// watchers see `Disconnected`/`Connected` on each transition; sessions and
    /// their ephemerals survive.
    pub fn set_available(&self, available: bool) {
        let _tree = self.shared.tree.lock();
        if self.shared.available.swap(available, Ordering::AcqRel) == available {
            return;
        }
        let state = if available {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        };
        for mut handle in self.shared.sessions.iter_mut() {
            if handle.state.is_terminal() {
                continue;
            }
            handle.state = state;
            handle.notify_default(state);
        }
        info!("Coordination service is now {}", state);
    }

    pub fn is_available(&self) -> bool {
        self.shared.available.load(Ordering::Acquire)
    }

    /// Delete a node out of band, firing watches as a client delete would.
    pub fn delete_node(&self, path: &str) -> Result<()> {
        let mut tree = self.shared.tree.lock();
        let mut fired = Vec::new();
        tree.delete(path, &mut fired)?;
        self.shared.dispatch(fired);
        Ok(())
    }

    /// Replace a node's payload out of band.
    pub fn set_data(&self, path: &str, data: Bytes) -> Result<NodeStat> {
        let mut tree = self.shared.tree.lock();
        let mut fired = Vec::new();
        let stat = tree.set_data(path, data, &mut fired)?;
        self.shared.dispatch(fired);
        Ok(stat)
    }

    pub fn node_exists(&self, path: &str) -> bool {
        self.shared.tree.lock().contains(path)
    }

    /// Sorted child names, `None` if the node does not exist.
    pub fn children_of(&self, path: &str) -> Option<Vec<String>> {
        self.shared.tree.lock().children_of(path)
    }

    /// Pending data and child watches registered on `path`.
    pub fn watch_count(&self, path: &str) -> usize {
        self.shared.tree.lock().watch_count(path)
    }

    pub fn stats(&self) -> CoordinatorStats {
        let tree = self.shared.tree.lock();
        CoordinatorStats {
            nodes: tree.node_count(),
            live_sessions: self
                .shared
                .sessions
                .iter()
                .filter(|handle| !handle.state.is_terminal())
                .count(),
            watches: tree.watch_total(),
            events_dispatched: self.shared.events_dispatched.load(Ordering::Relaxed),
        }
    }
}

impl Default for InMemoryCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
