//! # herald-node
//!
//! Runs a small Herald cluster inside one process on the in-memory
//! coordination service: one leader following the registry and a set of
//! workers serving `POST /task`.

use anyhow::{Context, Result};
use clap::Parser;
use herald_coordinator::InMemoryCoordinator;
use herald_core::{ConnectionMonitor, ConnectionState};
use herald_worker::{ClusterNode, NodeConfig, WorkerConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Herald demo cluster
#[derive(Parser, Debug)]
#[command(name = "herald-node")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of peers to start
    #[arg(long, default_value_t = 3)]
    peers: u16,

    /// Host the workers bind and advertise
    #[arg(long, default_value = "127.0.0.1", env = "HERALD_HOST")]
    host: String,

    /// Port of the first peer; peer i uses base-port + i
    #[arg(long, default_value_t = 8081)]
    base_port: u16,

    /// Shut the leader down after this many seconds to show failover
    #[arg(long)]
    failover_after: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, default_value = "false")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level, args.json_logs)?;

    info!("Starting herald-node v{}", env!("CARGO_PKG_VERSION"));

    let coordinator = InMemoryCoordinator::new();
    let mut nodes = Vec::with_capacity(args.peers as usize);
    let mut monitors = Vec::with_capacity(args.peers as usize);
    for index in 0..args.peers {
        let port = args
            .base_port
            .checked_add(index)
            .context("Port range overflows")?;
        let monitor = ConnectionMonitor::new();
        let session = coordinator.connect(Some(monitor.clone()));
        monitors.push(monitor);
        let config = NodeConfig::new().with_worker(
            WorkerConfig::new()
                .with_host(args.host.clone())
                .with_port(port),
        );
        let node = ClusterNode::new(Arc::new(session), config)
            .await
            .with_context(|| format!("Failed to prepare peer {}", index))?;
        node.start()
            .await
            .with_context(|| format!("Failed to start peer {}", index))?;
        nodes.push(node);
    }

    let failover = async {
        match args.failover_after {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(failover);
    let mut failover_done = false;

    let mut report = tokio::time::interval(Duration::from_secs(5));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            _ = &mut failover, if !failover_done => {
                failover_done = true;
                match nodes.iter().position(|node| node.election().is_leader()) {
                    Some(index) => {
                        let leader = nodes.remove(index);
                        warn!("Shutting down leader peer {} to trigger failover", index);
                        leader.shutdown().await;
                    }
                    None => warn!("No leader to fail over from"),
                }
            }
            _ = report.tick() => {
                if let Some(leader) = nodes.iter().find(|node| node.election().is_leader()) {
                    match leader.registry().get_all_addresses().await {
                        Ok(addresses) => info!("Workers: {:?}", addresses),
                        Err(e) => warn!("Failed to read workers: {}", e),
                    }
                }
                info!(
                    "Peers connected: {}/{}, coordinator: {:?}",
                    connected_peers(&monitors),
                    monitors.len(),
                    coordinator.stats()
                );
            }
        }
    }

    for node in &nodes {
        node.shutdown().await;
    }
    info!("herald-node shutdown complete");
    Ok(())
}

/// Number of sessions whose monitor last saw `Connected`.
fn connected_peers(monitors: &[Arc<ConnectionMonitor>]) -> usize {
    monitors
        .iter()
        .filter(|monitor| monitor.state() == Some(ConnectionState::Connected))
        .count()
}

/// Initialize structured logging with tracing
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
            .context("Failed to install JSON subscriber")?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .try_init()
            .context("Failed to install subscriber")?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::CoordinationClient;

    #[tokio::test]
    async fn test_connected_peers_follow_sessions() {
        let coordinator = InMemoryCoordinator::new();
        let monitors: Vec<_> = (0..3).map(|_| ConnectionMonitor::new()).collect();
        let sessions: Vec<_> = monitors
            .iter()
            .map(|monitor| coordinator.connect(Some(monitor.clone())))
            .collect();
        for monitor in &monitors {
            monitor.wait_until_connected().await;
        }
        assert_eq!(connected_peers(&monitors), 3);

        sessions[0].close().await.unwrap();
        assert_eq!(monitors[0].wait_for_disconnect().await, ConnectionState::Closed);
        assert_eq!(connected_peers(&monitors), 2);
    }
}
