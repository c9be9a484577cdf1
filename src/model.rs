//! The data model shared between the Watcher and the Worker.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

/// A Kubernetes workload kind the controller knows how to patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    DaemonSet,
    Deployment,
    ReplicationController,
    StatefulSet,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::DaemonSet => "DaemonSet",
            ResourceKind::Deployment => "Deployment",
            ResourceKind::ReplicationController => "ReplicationController",
            ResourceKind::StatefulSet => "StatefulSet",
        };
        f.write_str(s)
    }
}

/// The two source kinds the controller watches for changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKind {
    ConfigMap,
    Secret,
}

impl fmt::Display for ConfigKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConfigKind::ConfigMap => "ConfigMap",
            ConfigKind::Secret => "Secret",
        };
        f.write_str(s)
    }
}

/// A unit of work produced by the Watcher's resolver and consumed by the Worker.
///
/// Equality and hashing are over `(res_namespace, res_name)` only: the
/// dedup key is the target workload, not the dependency that triggered it.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub res_kind: ResourceKind,
    pub res_namespace: String,
    pub res_name: String,
    pub cfg_kind: ConfigKind,
    pub cfg_name: String,
    pub cfg_version: String,
}

impl WorkItem {
    pub fn target_key(&self) -> String {
        format!("{}/{}", self.res_namespace, self.res_name)
    }
}

impl PartialEq for WorkItem {
    fn eq(&self, other: &Self) -> bool {
        self.res_namespace == other.res_namespace && self.res_name == other.res_name
    }
}
impl Eq for WorkItem {}

impl std::hash::Hash for WorkItem {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.res_namespace.hash(state);
        self.res_name.hash(state);
    }
}

/// Per-target debounce state held by the Worker's pending-updates map.
#[derive(Debug, Clone)]
pub struct PendingUpdate {
    pub kind: ResourceKind,
    pub name: String,
    pub namespace: String,
    /// annotation key -> cfg_version, last writer wins.
    pub changes: BTreeMap<String, String>,
    /// Reset to `Instant::now()` on every coalesce; the entry is eligible to
    /// flush once `now - deadline_base > timeout`.
    pub deadline_base: Instant,
}

impl PendingUpdate {
    pub fn new(kind: ResourceKind, namespace: String, name: String, ann_key: String, cfg_version: String) -> Self {
        let mut changes = BTreeMap::new();
        changes.insert(ann_key, cfg_version);
        PendingUpdate {
            kind,
            name,
            namespace,
            changes,
            deadline_base: Instant::now(),
        }
    }

    pub fn coalesce(&mut self, ann_key: String, cfg_version: String) {
        self.changes.insert(ann_key, cfg_version);
        self.deadline_base = Instant::now();
    }

    pub fn is_expired(&self, timeout: std::time::Duration) -> bool {
        self.deadline_base.elapsed() > timeout
    }
}
