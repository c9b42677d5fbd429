//! Service registry with a watch-refreshed membership cache.

use crate::{RegistryError, RegistryResult};
use async_trait::async_trait;
use bytes::Bytes;
use herald_core::{
    ensure_persistent, path, CoordinationClient, CoordinationError, CreateMode, WatchEvent,
    WatchEventKind, WatchHandler, Watcher,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Configuration for a service registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Persistent node the entries are created under
    pub namespace: String,

    /// Name prefix of each entry's sequential node
    pub prefix: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            namespace: "/service_registry".to_string(),
            prefix: "n_".to_string(),
        }
    }
}

impl RegistryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }
}

/// Snapshot of every registered peer's metadata, ordered by entry name.
pub type Addresses = Arc<[String]>;

/// Publishes this peer and tracks everyone else.
///
/// Each registered peer owns one ephemeral sequential entry whose payload is
/// its metadata. The registry keeps a cached view of all payloads which is
/// filled lazily on first read and rebuilt wholesale whenever the namespace's
/// children change. A failed rebuild leaves the previous view in place.
///
/// Cloning shares the same registration and cache.
#[derive(Clone)]
pub struct ServiceRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    client: Arc<dyn CoordinationClient>,
    config: RegistryConfig,
    /// Full path of our entry; the lock serializes registration
    entry: Mutex<Option<String>>,
    /// `None` until the first successful refresh
    cache: Mutex<Option<Addresses>>,
}

impl ServiceRegistry {
    /// Create a registry, making sure its namespace exists.
    ///
    /// A failure to create the namespace is logged; operations needing it will
    /// report the problem themselves.
    pub async fn new(client: Arc<dyn CoordinationClient>, config: RegistryConfig) -> Self {
        let registry = Self {
            inner: Arc::new(RegistryInner {
                client,
                config,
                entry: Mutex::new(None),
                cache: Mutex::new(None),
            }),
        };
        registry.ensure_namespace().await;
        registry
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    /// Create the namespace node if nobody has yet.
    pub async fn ensure_namespace(&self) {
        let namespace = &self.inner.config.namespace;
        if let Err(e) = ensure_persistent(self.inner.client.as_ref(), namespace).await {
            warn!("Failed to create registry namespace {}: {}", namespace, e);
        }
    }

    /// Publish `metadata` as this peer's entry and return the entry path.
    ///
    /// Registering again while registered returns the existing entry.
    pub async fn register_to_cluster(&self, metadata: &str) -> RegistryResult<String> {
        if metadata.is_empty() {
            return Err(RegistryError::InvalidMetadata {
                reason: "metadata must not be empty".to_string(),
            });
        }

        let mut entry = self.inner.entry.lock().await;
        if let Some(existing) = entry.as_ref() {
            info!("Already registered to service registry as {}", existing);
            return Ok(existing.clone());
        }

        let prefix = path::join(&self.inner.config.namespace, &self.inner.config.prefix);
        let created = self
            .inner
            .client
            .create(
                &prefix,
                Bytes::copy_from_slice(metadata.as_bytes()),
                CreateMode::Ephemeral,
                true,
            )
            .await?;

        info!("Registered to service registry as {} ({})", created, metadata);
        *entry = Some(created.clone());
        Ok(created)
    }

    /// Remove our entry if it still exists.
    ///
    /// Best effort: failures are logged and the registration is kept so a later
    /// call can retry.
    pub async fn unregister_from_cluster(&self) {
        let mut entry = self.inner.entry.lock().await;
        let Some(path) = entry.clone() else {
            debug!("Not registered, nothing to unregister");
            return;
        };

        let client = &self.inner.client;
        let outcome = match client.exists(&path, None).await {
            Ok(Some(_)) => client.delete(&path).await,
            Ok(None) => Ok(()),
            Err(e) => Err(e),
        };
        match outcome {
            Ok(()) | Err(CoordinationError::NoNode { .. }) => {
                info!("Unregistered {} from service registry", path);
                *entry = None;
            }
            Err(e) => warn!("Failed to unregister {}: {}", path, e),
        }
    }

    /// Start following membership changes right away.
    pub async fn register_for_updates(&self) {
        self.inner.refresh_logged().await;
    }

    /// Addresses of every registered peer.
    ///
    /// Served from the cache; the first call fills it. An error is returned only
    /// if no snapshot has ever been taken.
    pub async fn get_all_addresses(&self) -> RegistryResult<Addresses> {
        let mut cache = self.inner.cache.lock().await;
        if let Some(snapshot) = cache.as_ref() {
            return Ok(snapshot.clone());
        }
        self.inner.refresh_locked(&mut cache).await
    }

    /// Rebuild the cache now and re-arm the membership watch.
    pub async fn refresh(&self) -> RegistryResult<Addresses> {
        let mut cache = self.inner.cache.lock().await;
        self.inner.refresh_locked(&mut cache).await
    }

    /// Full path of our entry while registered.
    pub async fn current_entry(&self) -> Option<String> {
        self.inner.entry.lock().await.clone()
    }
}

impl RegistryInner {
    async fn refresh_locked(
        self: &Arc<Self>,
        cache: &mut Option<Addresses>,
    ) -> RegistryResult<Addresses> {
        let namespace = &self.config.namespace;
        let watcher: Watcher = self.clone();
        let mut children = self.client.get_children(namespace, Some(watcher)).await?;
        children.sort();

        let mut addresses = Vec::with_capacity(children.len());
        for child in children {
            let child_path = path::join(namespace, &child);
            if self.client.exists(&child_path, None).await?.is_none() {
                debug!("Entry {} left before it could be read", child_path);
                continue;
            }
            match self.client.get_data(&child_path).await {
                Ok((data, _)) => match String::from_utf8(data.to_vec()) {
                    Ok(address) => addresses.push(address),
                    Err(_) => warn!("Skipping entry {} with non UTF-8 metadata", child_path),
                },
                Err(CoordinationError::NoNode { .. }) => {
                    debug!("Entry {} left before it could be read", child_path);
                }
                Err(e) => return Err(e.into()),
            }
        }

        let snapshot: Addresses = addresses.into();
        debug!("The cluster addresses are: {:?}", snapshot);
        *cache = Some(snapshot.clone());
        Ok(snapshot)
    }

    async fn refresh_logged(self: &Arc<Self>) {
        let mut cache = self.cache.lock().await;
        match self.refresh_locked(&mut cache).await {
            Ok(_) => {}
            Err(e) if e.is_connection_loss() => {
                warn!("Service registry view is stale, session unavailable: {}", e)
            }
            Err(e) => error!("Failed to refresh service registry: {}", e),
        }
    }
}

#[async_trait]
impl WatchHandler for RegistryInner {
    async fn handle(self: Arc<Self>, event: WatchEvent) {
        match event.kind {
            WatchEventKind::NodeChildrenChanged
            | WatchEventKind::NodeDataChanged
            | WatchEventKind::NodeDeleted
                if event.is_for(&self.config.namespace) =>
            {
                self.refresh_logged().await;
            }
            _ => debug!("Registry ignoring {}", event),
        }
    }
}
