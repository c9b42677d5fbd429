//! The election state machine.

use crate::{ElectionCallback, ElectionConfig, ElectionError, ElectionResult};
use async_trait::async_trait;
use bytes::Bytes;
use herald_core::{
    path, CoordinationClient, CreateMode, WatchEvent, WatchEventKind, WatchHandler, Watcher,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

/// Where a participant stands in the election
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElectionState {
    /// No participant node yet
    Unregistered,

    /// Participant node created, rank not yet computed
    Candidate,

    /// Watching the participant ranked right before us
    Follower {
        /// Bare name of the watched predecessor
        predecessor: String,
    },

    /// Smallest participant; terminal for the session
    Leader,
}

impl ElectionState {
    pub fn is_leader(&self) -> bool {
        matches!(self, ElectionState::Leader)
    }

    pub fn predecessor(&self) -> Option<&str> {
        match self {
            ElectionState::Follower { predecessor } => Some(predecessor),
            _ => None,
        }
    }
}

impl fmt::Display for ElectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElectionState::Unregistered => write!(f, "UNREGISTERED"),
            ElectionState::Candidate => write!(f, "CANDIDATE"),
            ElectionState::Follower { predecessor } => write!(f, "FOLLOWER({})", predecessor),
            ElectionState::Leader => write!(f, "LEADER"),
        }
    }
}

/// One participant in a leader election.
///
/// Participants create ephemeral sequential nodes under a shared namespace. The
/// smallest name leads; every other participant watches only the name right
/// before its own, so the loss of one node wakes exactly one follower.
///
/// The election is itself the watch handler for its predecessor watch: when the
/// watched node is deleted it evaluates again, reporting failures to
/// [`ElectionCallback::on_election_failed`] and falling back to
/// [`ElectionState::Candidate`]. Any other change to the predecessor only
/// re-arms the watch.
pub struct LeaderElection {
    client: Arc<dyn CoordinationClient>,
    config: ElectionConfig,
    callback: Arc<dyn ElectionCallback>,
    node_name: RwLock<Option<String>>,
    /// Full path of the predecessor our live watch is armed on
    watched: RwLock<Option<String>>,
    state_tx: watch::Sender<ElectionState>,
    volunteer_lock: Mutex<()>,
    evaluate_lock: Mutex<()>,
}

impl LeaderElection {
    pub fn new(
        client: Arc<dyn CoordinationClient>,
        config: ElectionConfig,
        callback: Arc<dyn ElectionCallback>,
    ) -> Arc<Self> {
        let (state_tx, _) = watch::channel(ElectionState::Unregistered);
        Arc::new(Self {
            client,
            config,
            callback,
            node_name: RwLock::new(None),
            watched: RwLock::new(None),
            state_tx,
            volunteer_lock: Mutex::new(()),
            evaluate_lock: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &ElectionConfig {
        &self.config
    }

    /// Bare name of our participant node, once volunteered.
    pub fn node_name(&self) -> Option<String> {
        self.node_name.read().clone()
    }

    pub fn state(&self) -> ElectionState {
        self.state_tx.borrow().clone()
    }

    pub fn is_leader(&self) -> bool {
        self.state_tx.borrow().is_leader()
    }

    /// Receiver of every state transition.
    pub fn subscribe(&self) -> watch::Receiver<ElectionState> {
        self.state_tx.subscribe()
    }

    /// Volunteer and settle our role.
    pub async fn start(self: &Arc<Self>) -> ElectionResult<ElectionState> {
        self.volunteer().await?;
        self.evaluate().await
    }

    /// Create our participant node and return its bare name.
    ///
    /// Idempotent: once a node exists, later calls return its name without
    /// touching the service.
    pub async fn volunteer(&self) -> ElectionResult<String> {
        let _guard = self.volunteer_lock.lock().await;
        let existing = self.node_name.read().clone();
        if let Some(name) = existing {
            debug!("Already volunteered as {}", name);
            return Ok(name);
        }

        let created = self
            .client
            .create(
                &self.config.participant_prefix(),
                Bytes::new(),
                CreateMode::Ephemeral,
                true,
            )
            .await
            .map_err(|e| self.classify(e))?;

        let name = path::name(&created).to_string();
        info!("Volunteered for leadership as {}", created);
        *self.node_name.write() = Some(name.clone());
        self.set_state(ElectionState::Candidate);
        Ok(name)
    }

    /// Compute our rank and act on it.
    ///
    /// The smallest participant becomes leader. Anyone else arms a watch on its
    /// immediate predecessor; if that predecessor vanished between listing and
    /// watching, the listing is taken again.
    pub async fn evaluate(self: &Arc<Self>) -> ElectionResult<ElectionState> {
        let name = self.node_name().ok_or(ElectionError::NotVolunteered)?;
        let _guard = self.evaluate_lock.lock().await;
        if self.is_leader() {
            return Ok(ElectionState::Leader);
        }

        let namespace = &self.config.namespace;
        let mut attempts = 0u32;
        loop {
            attempts += 1;

            let mut children = self
                .client
                .get_children(namespace, None)
                .await
                .map_err(|e| self.classify(e))?;
            children.sort();

            let position = children
                .iter()
                .position(|child| *child == name)
                .ok_or_else(|| ElectionError::ParticipantMissing { node: name.clone() })?;

            if position == 0 {
                *self.watched.write() = None;
                info!("I am the leader ({})", name);
                self.set_state(ElectionState::Leader);
                self.callback.on_elected_leader().await;
                return Ok(ElectionState::Leader);
            }

            let predecessor = children[position - 1].clone();
            let predecessor_path = path::join(namespace, &predecessor);
            *self.watched.write() = Some(predecessor_path.clone());

            let watcher: Watcher = self.clone();
            match self.client.exists(&predecessor_path, Some(watcher)).await {
                Ok(Some(_)) => {
                    info!("{} is watching {}", name, predecessor);
                    let state = ElectionState::Follower { predecessor };
                    self.set_state(state.clone());
                    self.callback.on_worker().await;
                    return Ok(state);
                }
                Ok(None) => {
                    *self.watched.write() = None;
                    debug!(
                        "Predecessor {} vanished before its watch was armed (attempt {})",
                        predecessor, attempts
                    );
                    if let Some(max) = self.config.max_attempts {
                        if attempts >= max {
                            warn!("Giving up re-evaluation after {} attempts", attempts);
                            return Err(ElectionError::RetriesExhausted { attempts });
                        }
                    }
                    let delay = self.config.retry_delay();
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(e) => {
                    *self.watched.write() = None;
                    return Err(self.classify(e));
                }
            }
        }
    }

    async fn reevaluate(self: &Arc<Self>) {
        if let Err(e) = self.evaluate().await {
            self.fail(e).await;
        }
    }

    /// Arm the predecessor watch again without re-ranking.
    async fn rearm(self: &Arc<Self>, path: &str) {
        let rearmed = {
            let _guard = self.evaluate_lock.lock().await;
            let current = self.watched.read().clone();
            if current.as_deref() != Some(path) {
                debug!("Watch on {} superseded, not re-arming", path);
                return;
            }
            let watcher: Watcher = self.clone();
            self.client.exists(path, Some(watcher)).await
        };

        match rearmed {
            Ok(Some(_)) => debug!("Re-armed watch on predecessor {}", path),
            Ok(None) => {
                info!("Predecessor {} left before its watch was re-armed", path);
                self.reevaluate().await;
            }
            Err(e) => {
                let error = self.classify(e);
                self.fail(error).await;
            }
        }
    }

    /// Drop back to candidate after a watch-driven failure and report it.
    async fn fail(&self, error: ElectionError) {
        {
            let _guard = self.evaluate_lock.lock().await;
            *self.watched.write() = None;
            if !self.is_leader() {
                self.set_state(ElectionState::Candidate);
            }
        }
        self.callback.on_election_failed(&error).await;
    }

    fn classify(&self, error: herald_core::CoordinationError) -> ElectionError {
        ElectionError::from_coordination(error, &self.config.namespace)
    }

    fn set_state(&self, state: ElectionState) {
        let previous = self.state_tx.send_replace(state.clone());
        if previous != state {
            debug!("Election state {} -> {}", previous, state);
        }
    }
}

#[async_trait]
impl WatchHandler for LeaderElection {
    async fn handle(self: Arc<Self>, event: WatchEvent) {
        let watched = self.watched.read().clone();
        let Some(path) = watched.filter(|path| event.is_for(path)) else {
            debug!("Election ignoring {}", event);
            return;
        };

        match event.kind {
            WatchEventKind::NodeDeleted => {
                info!("Predecessor {} is gone, re-evaluating", path);
                self.reevaluate().await;
            }
            // The event used up the watch but the predecessor is still there.
            _ => self.rearm(&path).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_coordinator::InMemoryCoordinator;
    use herald_core::ensure_persistent;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::timeout;

    #[derive(Default)]
    struct CountingCallback {
        leader: AtomicUsize,
        worker: AtomicUsize,
        failed: AtomicUsize,
    }

    #[async_trait]
    impl ElectionCallback for CountingCallback {
        async fn on_elected_leader(&self) {
            self.leader.fetch_add(1, Ordering::SeqCst);
        }

        async fn on_worker(&self) {
            self.worker.fetch_add(1, Ordering::SeqCst);
        }

        async fn on_election_failed(&self, _error: &ElectionError) {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn participant(
        coordinator: &InMemoryCoordinator,
    ) -> (Arc<LeaderElection>, Arc<CountingCallback>, herald_coordinator::InMemorySession) {
        let session = coordinator.connect(None);
        let callback = Arc::new(CountingCallback::default());
        let election = LeaderElection::new(
            Arc::new(session.clone()),
            ElectionConfig::default(),
            callback.clone(),
        );
        (election, callback, session)
    }

    async fn setup() -> InMemoryCoordinator {
        let coordinator = InMemoryCoordinator::new();
        let admin = coordinator.connect(None);
        ensure_persistent(&admin, "/election").await.unwrap();
        coordinator
    }

    #[tokio::test]
    async fn test_single_participant_leads() {
        let coordinator = setup().await;
        let (election, callback, _session) = participant(&coordinator).await;
        assert_eq!(election.state(), ElectionState::Unregistered);

        let state = election.start().await.unwrap();
        assert_eq!(state, ElectionState::Leader);
        assert!(election.is_leader());
        assert_eq!(election.node_name().as_deref(), Some("c_0000000000"));
        assert_eq!(callback.leader.load(Ordering::SeqCst), 1);
        assert_eq!(callback.worker.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_volunteer_is_idempotent() {
        let coordinator = setup().await;
        let (election, _callback, _session) = participant(&coordinator).await;

        let first = election.volunteer().await.unwrap();
        let second = election.volunteer().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(coordinator.children_of("/election").unwrap().len(), 1);
        assert_eq!(election.state(), ElectionState::Candidate);
    }

    #[tokio::test]
    async fn test_evaluate_requires_volunteering() {
        let coordinator = setup().await;
        let (election, _callback, _session) = participant(&coordinator).await;
        assert_eq!(
            election.evaluate().await.unwrap_err(),
            ElectionError::NotVolunteered
        );
    }

    #[tokio::test]
    async fn test_missing_namespace() {
        let coordinator = InMemoryCoordinator::new();
        let (election, _callback, _session) = participant(&coordinator).await;
        assert_eq!(
            election.volunteer().await.unwrap_err(),
            ElectionError::NamespaceMissing {
                namespace: "/election".to_string()
            }
        );
        assert_eq!(election.state(), ElectionState::Unregistered);
    }

    #[tokio::test]
    async fn test_unavailable_service_is_fatal() {
        let coordinator = setup().await;
        let (election, _callback, _session) = participant(&coordinator).await;
        coordinator.set_available(false);

        let err = election.volunteer().await.unwrap_err();
        assert!(matches!(err, ElectionError::CoordinationUnavailable { .. }));
        assert!(err.is_fatal());
        assert_eq!(election.node_name(), None);
    }

    #[tokio::test]
    async fn test_follower_takes_over_when_predecessor_leaves() {
        let coordinator = setup().await;
        let (first, _first_callback, first_session) = participant(&coordinator).await;
        let (second, second_callback, _second_session) = participant(&coordinator).await;

        first.start().await.unwrap();
        let state = second.start().await.unwrap();
        assert_eq!(
            state,
            ElectionState::Follower {
                predecessor: "c_0000000000".to_string()
            }
        );
        assert_eq!(second_callback.worker.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.watch_count("/election/c_0000000000"), 1);

        let mut states = second.subscribe();
        first_session.close().await.unwrap();

        timeout(Duration::from_secs(1), states.wait_for(|s| s.is_leader()))
            .await
            .expect("follower did not take over")
            .unwrap();
        assert_eq!(second_callback.leader.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unrelated_deletion_is_ignored() {
        let coordinator = setup().await;
        let (first, _c1, _s1) = participant(&coordinator).await;
        let (second, second_callback, _s2) = participant(&coordinator).await;
        first.start().await.unwrap();
        second.start().await.unwrap();

        second
            .clone()
            .handle(WatchEvent::node(
                WatchEventKind::NodeDeleted,
                "/election/c_0000000007",
            ))
            .await;
        second
            .clone()
            .handle(WatchEvent::node(
                WatchEventKind::NodeDataChanged,
                "/election/c_0000000000",
            ))
            .await;

        assert_eq!(second.state().predecessor(), Some("c_0000000000"));
        assert_eq!(second_callback.worker.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_own_node_deleted_reports_failure() {
        let coordinator = setup().await;
        let (first, _c1, _s1) = participant(&coordinator).await;
        let (second, second_callback, _s2) = participant(&coordinator).await;
        first.start().await.unwrap();
        second.start().await.unwrap();

        coordinator.delete_node("/election/c_0000000001").unwrap();
        assert_eq!(
            second.evaluate().await.unwrap_err(),
            ElectionError::ParticipantMissing {
                node: "c_0000000001".to_string()
            }
        );

        // The watch-driven path reports through the callback instead.
        coordinator.delete_node("/election/c_0000000000").unwrap();
        timeout(Duration::from_secs(1), async {
            while second_callback.failed.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("failure was not reported");
        assert_eq!(second.state(), ElectionState::Candidate);
    }

    #[tokio::test]
    async fn test_data_change_keeps_predecessor_watch() {
        let coordinator = setup().await;
        let (first, _c1, first_session) = participant(&coordinator).await;
        let (second, second_callback, _s2) = participant(&coordinator).await;
        first.start().await.unwrap();
        second.start().await.unwrap();

        coordinator
            .set_data("/election/c_0000000000", Bytes::from_static(b"x"))
            .unwrap();
        timeout(Duration::from_secs(1), async {
            while coordinator.watch_count("/election/c_0000000000") == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("predecessor watch was not re-armed");
        assert_eq!(second.state().predecessor(), Some("c_0000000000"));
        assert_eq!(second_callback.worker.load(Ordering::SeqCst), 1);
        assert_eq!(second_callback.leader.load(Ordering::SeqCst), 0);

        let mut states = second.subscribe();
        first_session.close().await.unwrap();
        timeout(Duration::from_secs(1), states.wait_for(|s| s.is_leader()))
            .await
            .expect("follower missed the predecessor deletion")
            .unwrap();
    }
}
