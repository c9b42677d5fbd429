//! Role-transition callbacks.

use crate::ElectionError;
use async_trait::async_trait;
use tracing::{error, info};

/// Hooks invoked when an election settles this participant's role.
///
/// `on_worker` runs every time a follower re-arms its watch, so it may be
/// called several times per candidacy. `on_elected_leader` runs once.
#[async_trait]
pub trait ElectionCallback: Send + Sync {
    async fn on_elected_leader(&self);

    async fn on_worker(&self);

    /// A watch-driven re-evaluation failed. Nobody awaits that evaluation, so
    /// this is the only place its error surfaces.
    async fn on_election_failed(&self, error: &ElectionError) {
        error!("Leader election failed: {}", error);
    }
}

/// Callback that only logs the outcome.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingCallback;

#[async_trait]
impl ElectionCallback for LoggingCallback {
    async fn on_elected_leader(&self) {
        info!("I am the leader");
    }

    async fn on_worker(&self) {
        info!("I am not the leader");
    }
}
