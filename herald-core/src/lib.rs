//! # Herald Core
//!
//! Shared building blocks for the Herald coordination recipes.
//!
//! Leader election and service discovery both run on top of an external
//! hierarchical coordination service (ZooKeeper-like) offering strong
//! consistency, ephemeral nodes tied to a session, atomic sequence numbering and
//! one-shot watches. This crate describes that service from the client side:
//!
//! - **CoordinationClient**: the session-oriented client trait
//! - **WatchHandler / WatchEvent**: tagged watch notifications and their receivers
//! - **ConnectionMonitor**: default watcher tracking connectivity
//! - **CoordinationError**: result codes of the service
//! - **path**: tree path helpers and namespace bootstrap

pub mod client;
pub mod error;
pub mod monitor;
pub mod path;
pub mod types;

pub use client::{channel_watcher, ChannelWatcher, CoordinationClient, WatchHandler, Watcher};
pub use error::*;
pub use monitor::ConnectionMonitor;
pub use path::ensure_persistent;
pub use types::*;
