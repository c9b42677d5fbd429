//! # Herald Worker
//!
//! The application side of a Herald cluster. Every node runs a leader
//! election; the leader follows the service registry while every other node
//! serves multiplication tasks over HTTP and advertises itself in the registry.
//!
//! - **task**: the arbitrary-precision multiplication a worker performs
//! - **http**: the axum router and server exposing it
//! - **node**: [`OnElectionAction`] and [`ClusterNode`] tying it all together

pub mod errors;
pub mod http;
pub mod node;
pub mod task;

pub use errors::{WorkerError, WorkerResult};
pub use http::{router, WorkerServer, STATUS_ENDPOINT, TASK_ENDPOINT};
pub use node::{ClusterNode, NodeConfig, OnElectionAction, WorkerConfig};
pub use task::{multiply, TaskError};
