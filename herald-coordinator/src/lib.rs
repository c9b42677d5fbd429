//! # Herald Coordinator
//!
//! An in-process implementation of the coordination service the Herald recipes
//! run on. It keeps a node tree with persistent, ephemeral and sequential
//! nodes, one-shot data and child watches, and per-session dispatchers that
//! deliver fired watches one at a time.
//!
//! Beyond the client surface it offers fault injection for tests and demos:
//! expiring a session, closing it, and taking the whole service offline.
//!
//! ```rust
//! use herald_coordinator::InMemoryCoordinator;
//! use herald_core::{ConnectionMonitor, CoordinationClient};
//!
//! # tokio_test::block_on(async {
//! let coordinator = InMemoryCoordinator::new();
//! let monitor = ConnectionMonitor::new();
//! let session = coordinator.connect(Some(monitor.clone()));
//! monitor.wait_until_connected().await;
//! assert!(session.exists("/", None).await.unwrap().is_some());
//! # });
//! ```

pub mod coordinator;
pub mod session;
mod tree;

pub use coordinator::{CoordinatorStats, InMemoryCoordinator};
pub use session::InMemorySession;
