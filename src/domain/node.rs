use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::api::capacity_dto::NodeDto;
use crate::domain::utils::id::NodeName;
use crate::error::{Error, Result};

pub const STATE_DOWN: &str = "down";
pub const STATE_OFFLINE: &str = "offline";

/// How the scheduler may use a node, derived once from its raw state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NodeActivity {
    /// Neither offline nor down. All configured processors count.
    Online,
    /// Offline but still running jobs. Only the running job slots count.
    Draining,
    /// Down, or offline with nothing left to run.
    Inactive,
}

/// A compute node as reported by the resource manager.
#[derive(Debug, Clone, Serialize)]
pub struct Node {
    pub name: NodeName,
    pub state: BTreeSet<String>,
    /// Configured processor count (`np`).
    pub np: i64,
    /// Job slots currently assigned, one entry per processor. `None` if the node reported no jobs.
    pub jobs: Option<Vec<String>>,
    /// Every other attribute reported for the node, untouched.
    pub attributes: BTreeMap<String, serde_json::Value>,
    activity: NodeActivity,
    active_processors: i64,
}

impl Node {
    pub fn new(name: NodeName, state: impl IntoIterator<Item = String>, np: i64, jobs: Option<Vec<String>>) -> Self {
        let state: BTreeSet<String> = state.into_iter().collect();
        let (activity, active_processors) = classify(&state, np, jobs.as_deref());

        Node { name, state, np, jobs, attributes: BTreeMap::new(), activity, active_processors }
    }

    pub fn from_dto(name: &str, dto: NodeDto) -> Result<Self> {
        let np = dto.np.as_ref().ok_or_else(|| Error::MalformedCapacitySource(format!("node {} has no processor count", name)))?.value()?;
        let jobs = dto.jobs.map(|jobs| jobs.into_items());

        let mut node = Node::new(NodeName::new(name), dto.state.into_items(), np, jobs);
        node.attributes = dto.attributes;
        Ok(node)
    }

    pub fn activity(&self) -> NodeActivity {
        self.activity
    }

    pub fn is_active(&self) -> bool {
        self.activity != NodeActivity::Inactive
    }

    /// Processors usable by the scheduler: `np` when online, running slots when draining, 0 otherwise.
    pub fn active_processors(&self) -> i64 {
        self.active_processors
    }

    /// Number of job slots the resource manager reports as in use.
    pub fn running_slots(&self) -> i64 {
        self.jobs.as_ref().map_or(0, |jobs| jobs.len() as i64)
    }
}

/// Node Activity Classifier.
///
/// A down node is unreachable and its job list may be stale (Torque only clears it when
/// the node restarts), so it is inactive whatever it reports. An offline node still
/// running jobs is draining and offers exactly its running slots.
pub fn classify(state: &BTreeSet<String>, np: i64, jobs: Option<&[String]>) -> (NodeActivity, i64) {
    if state.contains(STATE_DOWN) {
        return (NodeActivity::Inactive, 0);
    }

    if state.contains(STATE_OFFLINE) {
        return match jobs {
            Some(jobs) if !jobs.is_empty() => (NodeActivity::Draining, jobs.len() as i64),
            _ => (NodeActivity::Inactive, 0),
        };
    }

    (NodeActivity::Online, np)
}

/// Index of the active nodes and their active processor count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveNodes {
    procs: BTreeMap<NodeName, i64>,
}

impl ActiveNodes {
    pub fn from_nodes<'a>(nodes: impl IntoIterator<Item = &'a Node>) -> Self {
        let procs = nodes.into_iter().filter(|node| node.is_active()).map(|node| (node.name.clone(), node.active_processors())).collect();
        ActiveNodes { procs }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.procs.contains_key(name)
    }

    /// Active processor count of `name`, `None` if the node is not active.
    pub fn active_processors(&self, name: &str) -> Option<i64> {
        self.procs.get(name).copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &NodeName> {
        self.procs.keys()
    }

    pub fn len(&self) -> usize {
        self.procs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procs.is_empty()
    }
}
