//! Service registry integration tests
//!
//! Many registries on one in-memory coordination service: membership views,
//! idempotent registration, lazy first fill and failure handling.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::future::join_all;
use herald_coordinator::{InMemoryCoordinator, InMemorySession};
use herald_core::{
    ConnectionState, CoordinationClient, CreateMode, NodeStat, Result, SessionId, Watcher,
};
use herald_registry::{RegistryConfig, ServiceRegistry};
use herald_testing::{eventually, VanishAt, VanishingEntryClient};

const WAIT: Duration = Duration::from_secs(2);

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

async fn registry_on(coordinator: &InMemoryCoordinator) -> (ServiceRegistry, InMemorySession) {
    let session = coordinator.connect(None);
    let registry = ServiceRegistry::new(Arc::new(session.clone()), RegistryConfig::default()).await;
    (registry, session)
}

async fn view(registry: &ServiceRegistry) -> BTreeSet<String> {
    registry
        .get_all_addresses()
        .await
        .unwrap()
        .iter()
        .cloned()
        .collect()
}

/// Session counting the membership listings it performs.
struct CountingClient {
    inner: InMemorySession,
    listings: AtomicUsize,
}

#[async_trait]
impl CoordinationClient for CountingClient {
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
        self.inner.exists(path, watcher).await
    }

    async fn get_children(&self, path: &str, watcher: Option<Watcher>) -> Result<Vec<String>> {
        self.listings.fetch_add(1, Ordering::SeqCst);
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

#[tokio::test]
async fn test_k_registrations_are_all_visible() {
    init_logging();

    let coordinator = InMemoryCoordinator::new();
    let mut peers = Vec::new();
    for _ in 0..5 {
        peers.push(registry_on(&coordinator).await);
    }

    let registrations = peers.iter().enumerate().map(|(i, (registry, _))| {
        let registry = registry.clone();
        async move {
            registry
                .register_to_cluster(&format!("http://10.0.0.{}:8081/task", i))
                .await
        }
    });
    for result in join_all(registrations).await {
        result.unwrap();
    }

    let (observer, _session) = registry_on(&coordinator).await;
    let expected: BTreeSet<String> = (0..5)
        .map(|i| format!("http://10.0.0.{}:8081/task", i))
        .collect();
    assert_eq!(view(&observer).await, expected);
}

#[tokio::test]
async fn test_concurrent_register_creates_one_entry() {
    init_logging();

    let coordinator = InMemoryCoordinator::new();
    let (registry, _session) = registry_on(&coordinator).await;

    let attempts = (0..4).map(|_| {
        let registry = registry.clone();
        async move { registry.register_to_cluster("http://10.0.0.1:8081/task").await }
    });
    let entries: BTreeSet<String> = join_all(attempts)
        .await
        .into_iter()
        .map(|result| result.unwrap())
        .collect();

    assert_eq!(entries.len(), 1);
    assert_eq!(coordinator.children_of("/service_registry").unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_first_reads_fetch_once() {
    init_logging();

    let coordinator = InMemoryCoordinator::new();
    let (peer, _peer_session) = registry_on(&coordinator).await;
    peer.register_to_cluster("http://10.0.0.1:8081/task").await.unwrap();

    let client = Arc::new(CountingClient {
        inner: coordinator.connect(None),
        listings: AtomicUsize::new(0),
    });
    let observer = ServiceRegistry::new(client.clone(), RegistryConfig::default()).await;

    let reads = (0..8).map(|_| {
        let observer = observer.clone();
        async move { observer.get_all_addresses().await }
    });
    for addresses in join_all(reads).await {
        assert_eq!(&addresses.unwrap()[..], &["http://10.0.0.1:8081/task".to_string()]);
    }
    assert_eq!(client.listings.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_view_tracks_joins_and_session_loss() {
    init_logging();

    let coordinator = InMemoryCoordinator::new();
    let (observer, _s0) = registry_on(&coordinator).await;
    let (first, first_session) = registry_on(&coordinator).await;
    let (second, _s2) = registry_on(&coordinator).await;

    observer.register_for_updates().await;
    first.register_to_cluster("a").await.unwrap();
    second.register_to_cluster("b").await.unwrap();

    assert!(
        eventually(WAIT, || {
            let observer = observer.clone();
            async move { view(&observer).await.len() == 2 }
        })
        .await
    );

    coordinator.expire_session(first_session.session_id());
    assert!(
        eventually(WAIT, || {
            let observer = observer.clone();
            async move { view(&observer).await == BTreeSet::from(["b".to_string()]) }
        })
        .await
    );
}

#[tokio::test]
async fn test_transient_failure_keeps_populated_view() {
    init_logging();

    let coordinator = InMemoryCoordinator::new();
    let (observer, _s0) = registry_on(&coordinator).await;
    let (first, _s1) = registry_on(&coordinator).await;
    let (late, _s2) = registry_on(&coordinator).await;

    first.register_to_cluster("a").await.unwrap();
    let before = observer.get_all_addresses().await.unwrap();
    assert_eq!(before.len(), 1);

    coordinator.set_available(false);
    assert!(observer.refresh().await.is_err());
    assert_eq!(observer.get_all_addresses().await.unwrap(), before);

    // The watch armed by the last good refresh still delivers.
    coordinator.set_available(true);
    late.register_to_cluster("b").await.unwrap();
    assert!(
        eventually(WAIT, || {
            let observer = observer.clone();
            async move { view(&observer).await.len() == 2 }
        })
        .await
    );
}

#[tokio::test]
async fn test_unregistered_peer_leaves_view() {
    init_logging();

    let coordinator = InMemoryCoordinator::new();
    let (observer, _s0) = registry_on(&coordinator).await;
    let (peer, _s1) = registry_on(&coordinator).await;

    peer.register_to_cluster("a").await.unwrap();
    assert_eq!(view(&observer).await.len(), 1);

    peer.unregister_from_cluster().await;
    assert!(
        eventually(WAIT, || {
            let observer = observer.clone();
            async move { view(&observer).await.is_empty() }
        })
        .await
    );
    assert_eq!(peer.current_entry().await, None);
}

async fn read_around_vanishing_entry(at: VanishAt) {
    let coordinator = InMemoryCoordinator::new();
    let (first, _s1) = registry_on(&coordinator).await;
    let (second, _s2) = registry_on(&coordinator).await;
    let gone = first.register_to_cluster("a").await.unwrap();
    second.register_to_cluster("b").await.unwrap();

    let client = Arc::new(VanishingEntryClient::new(&coordinator, gone.clone(), at));
    let observer = ServiceRegistry::new(client.clone(), RegistryConfig::default()).await;

    let addresses = observer.get_all_addresses().await.unwrap();
    assert!(client.vanished());
    assert!(!coordinator.node_exists(&gone));
    assert_eq!(addresses.to_vec(), vec!["b".to_string()]);
}

#[tokio::test]
async fn test_refresh_skips_entry_gone_before_presence_check() {
    init_logging();
    read_around_vanishing_entry(VanishAt::Exists).await;
}

#[tokio::test]
async fn test_refresh_skips_entry_gone_before_payload_read() {
    init_logging();
    read_around_vanishing_entry(VanishAt::GetData).await;
}
