//! # Herald Registry
//!
//! Service discovery over a ZooKeeper-style coordination service.
//!
//! Peers publish their address as an ephemeral sequential entry under the
//! registry namespace; the entry disappears with the peer's session. Any peer
//! can read the full membership from a cache that is kept current by a
//! children watch on the namespace.
//!
//! ```rust
//! use herald_coordinator::InMemoryCoordinator;
//! use herald_registry::{RegistryConfig, ServiceRegistry};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let coordinator = InMemoryCoordinator::new();
//! let registry = ServiceRegistry::new(
//!     Arc::new(coordinator.connect(None)),
//!     RegistryConfig::default(),
//! )
//! .await;
//!
//! registry.register_to_cluster("http://127.0.0.1:8081/task").await.unwrap();
//! let addresses = registry.get_all_addresses().await.unwrap();
//! assert_eq!(addresses.to_vec(), vec!["http://127.0.0.1:8081/task".to_string()]);
//! # });
//! ```

pub mod errors;
pub mod registry;

pub use errors::{RegistryError, RegistryResult};
pub use registry::{Addresses, RegistryConfig, ServiceRegistry};
