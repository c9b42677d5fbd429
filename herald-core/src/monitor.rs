//! Connection-state tracking for a session's default watcher.

use crate::{ConnectionState, WatchEvent, WatchEventKind, WatchHandler};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Default watcher that records the session's connection state.
///
/// Install it when opening a session to observe the binary
/// connected/disconnected signal and to block until the session is gone.
pub struct ConnectionMonitor {
    state_tx: watch::Sender<Option<ConnectionState>>,
}

impl ConnectionMonitor {
    pub fn new() -> Arc<Self> {
        let (state_tx, _) = watch::channel(None);
        Arc::new(Self { state_tx })
    }

    /// Last observed state, `None` before the first connection event.
    pub fn state(&self) -> Option<ConnectionState> {
        *self.state_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<ConnectionState>> {
        self.state_tx.subscribe()
    }

    /// Wait for the first `Connected` event.
    pub async fn wait_until_connected(&self) {
        let mut rx = self.state_tx.subscribe();
        let _ = rx
            .wait_for(|state| matches!(state, Some(ConnectionState::Connected)))
            .await;
    }

    /// Wait until the session reports anything other than `Connected` and
    /// return that state.
    pub async fn wait_for_disconnect(&self) -> ConnectionState {
        let mut rx = self.state_tx.subscribe();
        let result = rx
            .wait_for(|state| matches!(state, Some(s) if !s.is_connected()))
            .await
            .map(|state| *state);
        match result {
            Ok(Some(state)) => state,
            _ => ConnectionState::Closed,
        }
    }
}

#[async_trait]
impl WatchHandler for ConnectionMonitor {
    async fn handle(self: Arc<Self>, event: WatchEvent) {
        match event.kind {
            WatchEventKind::ConnectionStateChanged(state) => {
                if state.is_connected() {
                    info!("Successfully connected to coordination service");
                } else {
                    warn!("Connection state changed to {}", state);
                }
                self.state_tx.send_replace(Some(state));
            }
            _ => debug!("Connection monitor ignoring {}", event),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_monitor_tracks_connection_events() {
        let monitor = ConnectionMonitor::new();
        assert_eq!(monitor.state(), None);

        monitor
            .clone()
            .handle(WatchEvent::connection(ConnectionState::Connected))
            .await;
        monitor.wait_until_connected().await;
        assert_eq!(monitor.state(), Some(ConnectionState::Connected));

        let waiter = {
            let monitor = monitor.clone();
            tokio::spawn(async move { monitor.wait_for_disconnect().await })
        };

        monitor
            .clone()
            .handle(WatchEvent::node(WatchEventKind::NodeDeleted, "/x"))
            .await;
        monitor
            .clone()
            .handle(WatchEvent::connection(ConnectionState::Expired))
            .await;

        assert_eq!(waiter.await.unwrap(), ConnectionState::Expired);
    }
}
