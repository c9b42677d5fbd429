//! Election callback recording every role transition.

use async_trait::async_trait;
use herald_election::{ElectionCallback, ElectionError};
use parking_lot::Mutex;
use std::sync::Arc;

/// A role transition as seen by the callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleEvent {
    ElectedLeader,
    Worker,
    Failed(ElectionError),
}

#[derive(Debug, Default)]
pub struct RecordingCallback {
    events: Mutex<Vec<RoleEvent>>,
}

impl RecordingCallback {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<RoleEvent> {
        self.events.lock().clone()
    }

    pub fn leader_count(&self) -> usize {
        self.count(|event| matches!(event, RoleEvent::ElectedLeader))
    }

    pub fn worker_count(&self) -> usize {
        self.count(|event| matches!(event, RoleEvent::Worker))
    }

    pub fn failures(&self) -> Vec<ElectionError> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                RoleEvent::Failed(error) => Some(error.clone()),
                _ => None,
            })
            .collect()
    }

    fn count(&self, predicate: impl Fn(&RoleEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|event| predicate(event)).count()
    }
}

#[async_trait]
impl ElectionCallback for RecordingCallback {
    async fn on_elected_leader(&self) {
        self.events.lock().push(RoleEvent::ElectedLeader);
    }

    async fn on_worker(&self) {
        self.events.lock().push(RoleEvent::Worker);
    }

    async fn on_election_failed(&self, error: &ElectionError) {
        self.events.lock().push(RoleEvent::Failed(error.clone()));
    }
}
