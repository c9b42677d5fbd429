//! Wiring election outcomes to the registry and the worker server.

use crate::http::{WorkerServer, TASK_ENDPOINT};
use crate::WorkerResult;
use async_trait::async_trait;
use herald_core::{ensure_persistent, CoordinationClient};
use herald_election::{ElectionCallback, ElectionConfig, ElectionState, LeaderElection};
use herald_registry::{RegistryConfig, ServiceRegistry};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Where a worker serves tasks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Host to bind and to advertise in the registry
    pub host: String,

    /// Port to bind; 0 picks a free one
    pub port: u16,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8081,
        }
    }
}

impl WorkerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

/// Everything a [`ClusterNode`] needs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub worker: WorkerConfig,
    pub election: ElectionConfig,
    pub registry: RegistryConfig,
}

impl NodeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_worker(mut self, worker: WorkerConfig) -> Self {
        self.worker = worker;
        self
    }

    pub fn with_election(mut self, election: ElectionConfig) -> Self {
        self.election = election;
        self
    }

    pub fn with_registry(mut self, registry: RegistryConfig) -> Self {
        self.registry = registry;
        self
    }
}

/// Election callback that turns the role into registry membership.
///
/// The leader coordinates and does not take tasks: it leaves the registry and
/// starts following it. A worker starts its HTTP server (once) and advertises
/// the task address.
pub struct OnElectionAction {
    registry: ServiceRegistry,
    config: WorkerConfig,
    server: Mutex<Option<WorkerServer>>,
}

impl OnElectionAction {
    pub fn new(registry: ServiceRegistry, config: WorkerConfig) -> Self {
        Self {
            registry,
            config,
            server: Mutex::new(None),
        }
    }

    /// Address of the running worker server.
    pub async fn server_addr(&self) -> Option<SocketAddr> {
        self.server.lock().await.as_ref().map(WorkerServer::local_addr)
    }

    /// Stop the worker server if it is running.
    pub async fn stop_server(&self) {
        let running = self.server.lock().await.take();
        if let Some(server) = running {
            server.shutdown().await;
        }
    }

    async fn ensure_server(&self) -> WorkerResult<SocketAddr> {
        let mut server = self.server.lock().await;
        if let Some(running) = server.as_ref() {
            return Ok(running.local_addr());
        }
        let started = WorkerServer::bind(&self.config.host, self.config.port).await?;
        let addr = started.local_addr();
        *server = Some(started);
        Ok(addr)
    }
}

#[async_trait]
impl ElectionCallback for OnElectionAction {
    async fn on_elected_leader(&self) {
        self.registry.unregister_from_cluster().await;
        self.registry.register_for_updates().await;
    }

    async fn on_worker(&self) {
        let addr = match self.ensure_server().await {
            Ok(addr) => addr,
            Err(e) => {
                error!("Failed to start worker server: {}", e);
                return;
            }
        };
        let task_address = format!("http://{}:{}{}", self.config.host, addr.port(), TASK_ENDPOINT);
        if let Err(e) = self.registry.register_to_cluster(&task_address).await {
            error!("Failed to register {}: {}", task_address, e);
        }
    }
}

/// One peer of the cluster: a session, its registry and its candidacy.
pub struct ClusterNode {
    client: Arc<dyn CoordinationClient>,
    registry: ServiceRegistry,
    election: Arc<LeaderElection>,
    action: Arc<OnElectionAction>,
}

impl ClusterNode {
    /// Prepare both namespaces and wire the election to the registry.
    pub async fn new(client: Arc<dyn CoordinationClient>, config: NodeConfig) -> WorkerResult<Self> {
        ensure_persistent(client.as_ref(), &config.election.namespace).await?;
        let registry = ServiceRegistry::new(client.clone(), config.registry).await;
        let action = Arc::new(OnElectionAction::new(registry.clone(), config.worker));
        let election = LeaderElection::new(client.clone(), config.election, action.clone());

        Ok(Self {
            client,
            registry,
            election,
            action,
        })
    }

    /// Volunteer and act on the resulting role.
    pub async fn start(&self) -> WorkerResult<ElectionState> {
        let state = self.election.start().await?;
        info!(
            "Node {} started as {}",
            self.client.session_id(),
            state
        );
        Ok(state)
    }

    /// Leave the cluster: unregister, stop serving and close the session.
    pub async fn shutdown(&self) {
        self.registry.unregister_from_cluster().await;
        self.action.stop_server().await;
        if let Err(e) = self.client.close().await {
            warn!("Failed to close session {}: {}", self.client.session_id(), e);
        }
        info!("Node {} shut down", self.client.session_id());
    }

    pub fn election(&self) -> &Arc<LeaderElection> {
        &self.election
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn client(&self) -> &Arc<dyn CoordinationClient> {
        &self.client
    }

    pub async fn server_addr(&self) -> Option<SocketAddr> {
        self.action.server_addr().await
    }
}
