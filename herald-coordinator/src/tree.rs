//! Node tree and watch tables of the in-memory service.
//!
//! The tree is plain data guarded by the coordinator's lock. Mutations never
//! call handlers directly; they append the watches they fire to a `Vec<Fired>`
//! which the caller hands to the owning sessions' dispatchers.

use bytes::Bytes;
use herald_core::{
    now_millis, path, CoordinationError, CreateMode, NodeStat, Result, SessionId, WatchEvent,
    WatchEventKind, Watcher,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// A stored node
pub(crate) struct ZNode {
    data: Bytes,
    mode: CreateMode,
    owner: Option<SessionId>,
    children: BTreeSet<String>,
    next_sequence: u64,
    version: u32,
    created_at: u64,
    modified_at: u64,
}

impl ZNode {
    fn new(data: Bytes, mode: CreateMode, owner: Option<SessionId>) -> Self {
        let now = now_millis();
        Self {
            data,
            mode,
            owner,
            children: BTreeSet::new(),
            next_sequence: 0,
            version: 0,
            created_at: now,
            modified_at: now,
        }
    }

    fn stat(&self) -> NodeStat {
        NodeStat {
            version: self.version,
            num_children: self.children.len(),
            ephemeral_owner: self.owner,
            created_at: self.created_at,
            modified_at: self.modified_at,
            data_length: self.data.len(),
        }
    }
}

/// A watch that fired and still has to reach its session's dispatcher.
pub(crate) struct Fired {
    pub session: SessionId,
    pub watcher: Watcher,
    pub event: WatchEvent,
}

struct Registration {
    session: SessionId,
    watcher: Watcher,
}

fn same_watcher(a: &Watcher, b: &Watcher) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// One-shot watches keyed by path.
#[derive(Default)]
struct WatchTable {
    by_path: HashMap<String, Vec<Registration>>,
}

impl WatchTable {
    fn add(&mut self, path: &str, session: SessionId, watcher: Watcher) {
        let registrations = self.by_path.entry(path.to_string()).or_default();
        let duplicate = registrations
            .iter()
            .any(|r| r.session == session && same_watcher(&r.watcher, &watcher));
        if !duplicate {
            registrations.push(Registration { session, watcher });
        }
    }

    fn take(&mut self, path: &str) -> Vec<Registration> {
        self.by_path.remove(path).unwrap_or_default()
    }

    fn drop_session(&mut self, session: SessionId) {
        self.by_path.retain(|_, registrations| {
            registrations.retain(|r| r.session != session);
            !registrations.is_empty()
        });
    }

    fn count(&self, path: &str) -> usize {
        self.by_path.get(path).map(Vec::len).unwrap_or(0)
    }

    fn total(&self) -> usize {
        self.by_path.values().map(Vec::len).sum()
    }
}

/// The coordination tree.
pub(crate) struct Tree {
    nodes: HashMap<String, ZNode>,
    data_watches: WatchTable,
    child_watches: WatchTable,
}

impl Tree {
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(
            path::ROOT.to_string(),
            ZNode::new(Bytes::new(), CreateMode::Persistent, None),
        );
        Self {
            nodes,
            data_watches: WatchTable::default(),
            child_watches: WatchTable::default(),
        }
    }

    pub fn create(
        &mut self,
        session: SessionId,
        path: &str,
        data: Bytes,
        mode: CreateMode,
        sequential: bool,
        fired: &mut Vec<Fired>,
    ) -> Result<String> {
        path::validate(path)?;
        let parent_path = path::parent(path)
            .ok_or_else(|| CoordinationError::node_exists(path))?
            .to_string();

        let full = {
            let parent = self
                .nodes
                .get_mut(&parent_path)
                .ok_or_else(|| CoordinationError::no_node(path))?;
            if parent.mode.is_ephemeral() {
                return Err(CoordinationError::NoChildrenForEphemerals { path: parent_path });
            }
            let full = if sequential {
                let sequence = parent.next_sequence;
                parent.next_sequence += 1;
                path::sequential(path, sequence)
            } else {
                path.to_string()
            };
            let name = path::name(&full).to_string();
            if !parent.children.insert(name) {
                return Err(CoordinationError::node_exists(full));
            }
            parent.modified_at = now_millis();
            full
        };

        let owner = mode.is_ephemeral().then_some(session);
        self.nodes.insert(full.clone(), ZNode::new(data, mode, owner));

        self.fire_data(&full, WatchEventKind::NodeCreated, fired);
        self.fire_children(&parent_path, fired);
        Ok(full)
    }

    pub fn delete(&mut self, path: &str, fired: &mut Vec<Fired>) -> Result<()> {
        path::validate(path)?;
        let parent_path = path::parent(path)
            .ok_or_else(|| CoordinationError::invalid_path(path, "cannot delete the root"))?
            .to_string();

        match self.nodes.get(path) {
            None => return Err(CoordinationError::no_node(path)),
            Some(node) if !node.children.is_empty() => {
                return Err(CoordinationError::NotEmpty {
                    path: path.to_string(),
                })
            }
            Some(_) => {}
        }

        self.nodes.remove(path);
        if let Some(parent) = self.nodes.get_mut(&parent_path) {
            parent.children.remove(path::name(path));
            parent.modified_at = now_millis();
        }

        // Data and child watches on the deleted node both see one NodeDeleted.
        let mut registrations = self.data_watches.take(path);
        for registration in self.child_watches.take(path) {
            let duplicate = registrations.iter().any(|r| {
                r.session == registration.session
                    && same_watcher(&r.watcher, &registration.watcher)
            });
            if !duplicate {
                registrations.push(registration);
            }
        }
        for registration in registrations {
            fired.push(Fired {
                session: registration.session,
                watcher: registration.watcher,
                event: WatchEvent::node(WatchEventKind::NodeDeleted, path),
            });
        }

        self.fire_children(&parent_path, fired);
        Ok(())
    }

    pub fn set_data(&mut self, path: &str, data: Bytes, fired: &mut Vec<Fired>) -> Result<NodeStat> {
        path::validate(path)?;
        let node = self
            .nodes
            .get_mut(path)
            .ok_or_else(|| CoordinationError::no_node(path))?;
        node.data = data;
        node.version += 1;
        node.modified_at = now_millis();
        let stat = node.stat();

        self.fire_data(path, WatchEventKind::NodeDataChanged, fired);
        Ok(stat)
    }

    pub fn exists(
        &mut self,
        session: SessionId,
        path: &str,
        watcher: Option<Watcher>,
    ) -> Result<Option<NodeStat>> {
        path::validate(path)?;
        if let Some(watcher) = watcher {
            self.data_watches.add(path, session, watcher);
        }
        Ok(self.nodes.get(path).map(ZNode::stat))
    }

    pub fn children(
        &mut self,
        session: SessionId,
        path: &str,
        watcher: Option<Watcher>,
    ) -> Result<Vec<String>> {
        path::validate(path)?;
        let children: Vec<String> = self
            .nodes
            .get(path)
            .ok_or_else(|| CoordinationError::no_node(path))?
            .children
            .iter()
            .cloned()
            .collect();
        if let Some(watcher) = watcher {
            self.child_watches.add(path, session, watcher);
        }
        Ok(children)
    }

    pub fn data(&self, path: &str) -> Result<(Bytes, NodeStat)> {
        path::validate(path)?;
        self.nodes
            .get(path)
            .map(|node| (node.data.clone(), node.stat()))
            .ok_or_else(|| CoordinationError::no_node(path))
    }

    /// Drop a session's watches and delete its ephemeral nodes.
    pub fn remove_session(&mut self, session: SessionId, fired: &mut Vec<Fired>) -> usize {
        self.data_watches.drop_session(session);
        self.child_watches.drop_session(session);

        let mut ephemerals: Vec<String> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.owner == Some(session))
            .map(|(path, _)| path.clone())
            .collect();
        ephemerals.sort();

        let mut removed = 0;
        for path in ephemerals {
            if self.delete(&path, fired).is_ok() {
                removed += 1;
            }
        }
        removed
    }

    pub fn contains(&self, path: &str) -> bool {
        self.nodes.contains_key(path)
    }

    pub fn children_of(&self, path: &str) -> Option<Vec<String>> {
        self.nodes
            .get(path)
            .map(|node| node.children.iter().cloned().collect())
    }

    pub fn watch_count(&self, path: &str) -> usize {
        self.data_watches.count(path) + self.child_watches.count(path)
    }

    pub fn watch_total(&self) -> usize {
        self.data_watches.total() + self.child_watches.total()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn fire_data(&mut self, path: &str, kind: WatchEventKind, fired: &mut Vec<Fired>) {
        for registration in self.data_watches.take(path) {
            fired.push(Fired {
                session: registration.session,
                watcher: registration.watcher,
                event: WatchEvent::node(kind, path),
            });
        }
    }

    fn fire_children(&mut self, parent_path: &str, fired: &mut Vec<Fired>) {
        for registration in self.child_watches.take(parent_path) {
            fired.push(Fired {
                session: registration.session,
                watcher: registration.watcher,
                event: WatchEvent::node(WatchEventKind::NodeChildrenChanged, parent_path),
            });
        }
    }
}
