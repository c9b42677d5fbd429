//! Path helpers for the coordination tree.

use crate::{CoordinationClient, CoordinationError, CreateMode, Result};
use bytes::Bytes;
use tracing::{debug, info};

/// Root of the tree.
pub const ROOT: &str = "/";

/// Width of the numeric suffix appended to sequential nodes.
pub const SEQUENCE_WIDTH: usize = 10;

/// Check that `path` is absolute, has no empty or relative segments and no
/// trailing separator (the root excepted).
pub fn validate(path: &str) -> Result<()> {
    if path == ROOT {
        return Ok(());
    }
    if !path.starts_with('/') {
        return Err(CoordinationError::invalid_path(path, "must start with '/'"));
    }
    if path.ends_with('/') {
        return Err(CoordinationError::invalid_path(path, "must not end with '/'"));
    }
    for segment in path[1..].split('/') {
        match segment {
            "" => return Err(CoordinationError::invalid_path(path, "empty segment")),
            "." | ".." => {
                return Err(CoordinationError::invalid_path(path, "relative segment"))
            }
            _ => {}
        }
    }
    Ok(())
}

/// Full path of `child` under `parent`.
pub fn join(parent: &str, child: &str) -> String {
    if parent == ROOT {
        format!("/{}", child)
    } else {
        format!("{}/{}", parent, child)
    }
}

/// Parent of `path`, `None` for the root.
pub fn parent(path: &str) -> Option<&str> {
    if path == ROOT {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some(ROOT),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Last segment of `path`.
pub fn name(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// `prefix` with a zero-padded sequence number appended.
pub fn sequential(prefix: &str, sequence: u64) -> String {
    format!("{}{:0width$}", prefix, sequence, width = SEQUENCE_WIDTH)
}

/// Create `path` as an empty persistent node unless it already exists.
///
/// Returns whether this call created it. A concurrent creator winning the race
/// is not an error.
pub async fn ensure_persistent(client: &dyn CoordinationClient, path: &str) -> Result<bool> {
    if client.exists(path, None).await?.is_some() {
        debug!("Namespace {} already present", path);
        return Ok(false);
    }
    match client
        .create(path, Bytes::new(), CreateMode::Persistent, false)
        .await
    {
        Ok(created) => {
            info!("Created namespace {}", created);
            Ok(true)
        }
        Err(CoordinationError::NodeExists { .. }) => {
            debug!("Namespace {} created concurrently", path);
            Ok(false)
        }
        Err(e) => Err(e),
    }
}
