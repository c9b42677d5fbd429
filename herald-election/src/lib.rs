//! # Herald Election
//!
//! Leader election over a ZooKeeper-style coordination service.
//!
//! Every participant creates an ephemeral sequential node under the election
//! namespace. The participant with the smallest name is the leader; each other
//! participant watches only the node ranked immediately before its own. When a
//! node disappears exactly one follower wakes up and re-evaluates, so failover
//! cascades one step at a time with no herd effect.
//!
//! Two ways to drive it:
//! - [`LeaderElection::start`] with an [`ElectionCallback`] for embedding
//! - [`StandaloneElection::run`] which blocks until the session is gone
//!
//! The namespace must exist before anyone volunteers; see
//! [`herald_core::ensure_persistent`].
//!
//! ```rust
//! use herald_coordinator::InMemoryCoordinator;
//! use herald_core::ensure_persistent;
//! use herald_election::{ElectionConfig, LeaderElection, LoggingCallback};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let coordinator = InMemoryCoordinator::new();
//! let session = Arc::new(coordinator.connect(None));
//! ensure_persistent(session.as_ref(), "/election").await.unwrap();
//!
//! let election = LeaderElection::new(session, ElectionConfig::default(), Arc::new(LoggingCallback));
//! assert!(election.start().await.unwrap().is_leader());
//! # });
//! ```

pub mod callback;
pub mod config;
pub mod election;
pub mod errors;
pub mod standalone;

pub use callback::{ElectionCallback, LoggingCallback};
pub use config::ElectionConfig;
pub use election::{ElectionState, LeaderElection};
pub use errors::{ElectionError, ElectionResult};
pub use standalone::StandaloneElection;
