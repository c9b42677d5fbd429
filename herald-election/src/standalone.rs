//! Blocking run-until-disconnected adapter.

use crate::{
    ElectionCallback, ElectionConfig, ElectionResult, ElectionState, LeaderElection,
    LoggingCallback,
};
use herald_core::{ConnectionMonitor, CoordinationClient};
use std::sync::Arc;
use tracing::info;

/// Runs one candidacy for the lifetime of a session.
///
/// The session must have been opened with `monitor` as its default watcher.
/// [`StandaloneElection::run`] volunteers, settles the role and then parks
/// until the session is disconnected, expired or closed.
pub struct StandaloneElection {
    election: Arc<LeaderElection>,
    monitor: Arc<ConnectionMonitor>,
}

impl StandaloneElection {
    /// Election that just logs its outcome.
    pub fn new(
        client: Arc<dyn CoordinationClient>,
        monitor: Arc<ConnectionMonitor>,
        config: ElectionConfig,
    ) -> Self {
        Self::with_callback(client, monitor, config, Arc::new(LoggingCallback))
    }

    pub fn with_callback(
        client: Arc<dyn CoordinationClient>,
        monitor: Arc<ConnectionMonitor>,
        config: ElectionConfig,
        callback: Arc<dyn ElectionCallback>,
    ) -> Self {
        Self {
            election: LeaderElection::new(client, config, callback),
            monitor,
        }
    }

    pub fn election(&self) -> &Arc<LeaderElection> {
        &self.election
    }

    /// Run the candidacy and return the state it ended in.
    pub async fn run(&self) -> ElectionResult<ElectionState> {
        self.election.start().await?;
        let connection = self.monitor.wait_for_disconnect().await;
        let state = self.election.state();
        info!(
            "Session {}, leaving the election as {}",
            connection, state
        );
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_coordinator::InMemoryCoordinator;
    use herald_core::{ensure_persistent, CoordinationClient};

    #[tokio::test]
    async fn test_run_returns_after_session_closes() {
        let coordinator = InMemoryCoordinator::new();
        let monitor = ConnectionMonitor::new();
        let session = coordinator.connect(Some(monitor.clone()));
        monitor.wait_until_connected().await;
        ensure_persistent(&session, "/election").await.unwrap();

        let standalone =
            StandaloneElection::new(Arc::new(session.clone()), monitor, ElectionConfig::default());
        let mut states = standalone.election().subscribe();

        let closer = tokio::spawn(async move {
            let _ = states.wait_for(|s| s.is_leader()).await;
            session.close().await.unwrap();
        });

        let state = standalone.run().await.unwrap();
        assert_eq!(state, ElectionState::Leader);
        closer.await.unwrap();
    }
}
