//! Multi-participant election harness on the in-memory service.

use crate::RecordingCallback;
use futures_util::future::join_all;
use herald_coordinator::InMemoryCoordinator;
use herald_core::{ensure_persistent, CoordinationClient, Result};
use herald_election::{ElectionConfig, ElectionResult, ElectionState, LeaderElection};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// One participant and the session it runs on
pub struct Participant {
    pub client: Arc<dyn CoordinationClient>,
    pub election: Arc<LeaderElection>,
    pub callback: Arc<RecordingCallback>,
}

impl Participant {
    pub fn node_name(&self) -> Option<String> {
        self.election.node_name()
    }
}

/// A set of participants sharing one in-memory coordination service.
pub struct ElectionHarness {
    pub coordinator: InMemoryCoordinator,
    config: ElectionConfig,
    participants: Vec<Participant>,
    killed: Mutex<HashSet<usize>>,
}

impl ElectionHarness {
    /// Fresh service with the election namespace already created.
    pub async fn new(config: ElectionConfig) -> Result<Self> {
        let coordinator = InMemoryCoordinator::new();
        let admin = coordinator.connect(None);
        ensure_persistent(&admin, &config.namespace).await?;
        Ok(Self {
            coordinator,
            config,
            participants: Vec::new(),
            killed: Mutex::new(HashSet::new()),
        })
    }

    /// Harness with `count` participants, none volunteered yet.
    pub async fn with_participants(count: usize, config: ElectionConfig) -> Result<Self> {
        let mut harness = Self::new(config).await?;
        for _ in 0..count {
            harness.add_participant();
        }
        Ok(harness)
    }

    /// Add a participant on a new session and return its index.
    pub fn add_participant(&mut self) -> usize {
        let client: Arc<dyn CoordinationClient> = Arc::new(self.coordinator.connect(None));
        self.add_participant_with_client(client)
    }

    /// Add a participant running on `client`.
    pub fn add_participant_with_client(&mut self, client: Arc<dyn CoordinationClient>) -> usize {
        let callback = RecordingCallback::new();
        let election = LeaderElection::new(client.clone(), self.config.clone(), callback.clone());
        self.participants.push(Participant {
            client,
            election,
            callback,
        });
        self.participants.len() - 1
    }

    pub fn participant(&self, index: usize) -> &Participant {
        &self.participants[index]
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Volunteer and evaluate one participant.
    pub async fn start(&self, index: usize) -> ElectionResult<ElectionState> {
        self.participants[index].election.start().await
    }

    /// Start participants one after another, in index order.
    pub async fn start_in_order(&self) -> Vec<ElectionResult<ElectionState>> {
        let mut results = Vec::with_capacity(self.participants.len());
        for participant in &self.participants {
            results.push(participant.election.start().await);
        }
        results
    }

    /// Start every participant at the same time.
    pub async fn start_concurrently(&self) -> Vec<ElectionResult<ElectionState>> {
        let starts = self.participants.iter().map(|participant| {
            let election = participant.election.clone();
            async move { election.start().await }
        });
        join_all(starts).await
    }

    /// Indices of live participants currently in the leader state.
    ///
    /// A killed participant keeps whatever state it had; it is left out here.
    pub fn leaders(&self) -> Vec<usize> {
        let killed = self.killed.lock();
        self.participants
            .iter()
            .enumerate()
            .filter(|(index, participant)| {
                !killed.contains(index) && participant.election.is_leader()
            })
            .map(|(index, _)| index)
            .collect()
    }

    pub fn is_alive(&self, index: usize) -> bool {
        !self.killed.lock().contains(&index)
    }

    /// Close a participant's session, removing its node.
    pub async fn kill(&self, index: usize) {
        let participant = &self.participants[index];
        info!(
            "Killing participant {} ({:?})",
            index,
            participant.node_name()
        );
        self.killed.lock().insert(index);
        let _ = participant.client.close().await;
    }

    /// Wait until participant `index` becomes leader.
    pub async fn wait_for_leader(&self, index: usize, within: Duration) -> bool {
        let mut states = self.participants[index].election.subscribe();
        tokio::time::timeout(within, states.wait_for(|state| state.is_leader()))
            .await
            .map(|result| result.is_ok())
            .unwrap_or(false)
    }
}

/// Poll `check` until it holds or `within` elapses.
pub async fn eventually<F, Fut>(within: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
