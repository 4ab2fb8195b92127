use std::collections::BTreeMap;
use std::sync::Arc;

use log::Level;
use serde::Serialize;

use crate::api::capacity_dto::CapacitySnapshotDto;
use crate::domain::node::{ActiveNodes, Node, NodeActivity};
use crate::domain::queue::Queue;
use crate::domain::reservation::reservation::Reservation;
use crate::domain::reservation::reservation_parser::{ReservationMap, ReservationParser};
use crate::domain::rms::capacity_source::CapacitySource;
use crate::domain::rms::diagnose::DiagnoseSource;
use crate::domain::utils::emitter::DiagnosticEmitter;
use crate::domain::utils::id::{NodeName, QueueName};
use crate::error::Result;

/// Nodes a query applies to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NodeSelection {
    #[default]
    All,
    One(String),
    Many(Vec<String>),
}

impl From<&str> for NodeSelection {
    fn from(name: &str) -> Self {
        NodeSelection::One(name.to_string())
    }
}

impl From<Vec<&str>> for NodeSelection {
    fn from(names: Vec<&str>) -> Self {
        NodeSelection::Many(names.into_iter().map(String::from).collect())
    }
}

impl From<Vec<String>> for NodeSelection {
    fn from(names: Vec<String>) -> Self {
        NodeSelection::Many(names)
    }
}

/// Job slots of a set of standing reservations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SlotCounts {
    pub total: i64,
    pub used: i64,
    pub free: i64,
}

impl SlotCounts {
    pub fn new(total: i64, used: i64) -> Self {
        SlotCounts { total, used, free: total - used }
    }
}

/// Summary printed by the command line tool.
#[derive(Debug, Clone, Serialize)]
pub struct CapacityReport {
    pub server: String,
    pub scheduler_version: String,
    pub node_count: usize,
    pub active_node_count: usize,
    pub active_procs: i64,
    pub total_used_slots: i64,
    pub reservation_slots: SlotCounts,
    pub queue_slots: BTreeMap<String, SlotCounts>,
}

/// Consistent capacity view of one resource manager server and its scheduler reservations.
///
/// Built from scratch on every run and never mutated afterwards.
#[derive(Debug)]
pub struct CapacityModel {
    server: String,
    scheduler_version: String,
    nodes: BTreeMap<NodeName, Node>,
    queues: BTreeMap<QueueName, Queue>,
    active_nodes: ActiveNodes,
    reservations: ReservationMap,
    emitter: Arc<dyn DiagnosticEmitter>,
}

impl CapacityModel {
    /// Queries the resource manager, then parses the diagnose output against the live node state.
    pub fn load(server: &str, source: &dyn CapacitySource, diagnose: &DiagnoseSource, emitter: Arc<dyn DiagnosticEmitter>) -> Result<Self> {
        let snapshot = source.query(server)?;
        Self::from_snapshot(server, snapshot, emitter)?.with_reservations(diagnose)
    }

    /// Builds the node and queue part of the model. No reservation is known yet.
    pub fn from_snapshot(server: &str, snapshot: CapacitySnapshotDto, emitter: Arc<dyn DiagnosticEmitter>) -> Result<Self> {
        let mut nodes = BTreeMap::new();
        for (name, dto) in snapshot.nodes {
            let node = Node::from_dto(&name, dto)?;
            match node.activity() {
                NodeActivity::Online => {}
                NodeActivity::Draining => {
                    emitter.emit(Level::Debug, &format!("Node {} state: {:?}", name, node.state));
                    emitter.emit(Level::Info, &format!("Node {} inactive but {} procs still active", name, node.active_processors()));
                }
                NodeActivity::Inactive => emitter.emit(Level::Debug, &format!("Node {} state: {:?}", name, node.state)),
            }
            nodes.insert(node.name.clone(), node);
        }

        let queues: BTreeMap<QueueName, Queue> =
            snapshot.queues.into_iter().map(|(name, dto)| (QueueName::new(name.as_str()), Queue::from_dto(&name, dto))).collect();

        let active_nodes = ActiveNodes::from_nodes(nodes.values());

        emitter.emit(Level::Info, &format!("Number of Torque nodes detected: {} (active={})", nodes.len(), active_nodes.len()));
        emitter.emit(Level::Trace, &format!("Torque nodes: {:?}", nodes));
        emitter.emit(Level::Info, &format!("Number of Torque queues detected: {}", queues.len()));
        emitter.emit(Level::Trace, &format!("Torque queues: {:?}", queues));

        Ok(CapacityModel {
            server: server.to_string(),
            scheduler_version: snapshot.pbs_version,
            nodes,
            queues,
            active_nodes,
            reservations: ReservationMap::new(),
            emitter,
        })
    }

    /// Adds the reservations of `diagnose` to a model built with [`CapacityModel::from_snapshot`].
    pub fn with_reservations(mut self, diagnose: &DiagnoseSource) -> Result<Self> {
        let parser = ReservationParser::new(&self.active_nodes, &*self.emitter);
        let reservations = diagnose.read_reservations(&parser)?;
        self.reservations = reservations;
        Ok(self)
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn scheduler_version(&self) -> &str {
        &self.scheduler_version
    }

    pub fn queue_names(&self) -> Vec<&str> {
        self.queues.keys().map(QueueName::as_str).collect()
    }

    pub fn node_names(&self) -> Vec<&str> {
        self.nodes.keys().map(NodeName::as_str).collect()
    }

    /// Returns `None` (and says so through the emitter) if the queue does not exist.
    pub fn queue_params(&self, queue: &str) -> Option<&Queue> {
        let found = self.queues.get(queue);
        if found.is_none() {
            self.emitter.emit(Level::Info, &format!("queue_params: queue {} doesn't exist", queue));
        }
        found
    }

    /// Returns `None` (and says so through the emitter) if the node does not exist.
    pub fn node_params(&self, node: &str) -> Option<&Node> {
        let found = self.nodes.get(node);
        if found.is_none() {
            self.emitter.emit(Level::Info, &format!("node_params: node {} doesn't exist", node));
        }
        found
    }

    /// Job slots in use on active nodes, one per entry of their job list.
    pub fn total_used_slots(&self) -> i64 {
        self.active_nodes.names().filter_map(|name| self.nodes.get(name)).map(Node::running_slots).sum()
    }

    /// Active nodes among `selection`. Draining nodes still running jobs are active.
    pub fn active_nodes(&self, selection: impl Into<NodeSelection>) -> Vec<&NodeName> {
        match selection.into() {
            NodeSelection::All => self.active_nodes.names().collect(),
            NodeSelection::One(name) => self.active_nodes.names().filter(|active| active.as_str() == name).collect(),
            NodeSelection::Many(names) => self.active_nodes.names().filter(|active| names.iter().any(|name| name == active.as_str())).collect(),
        }
    }

    /// Sum of the active processors of `selection`. Inactive nodes count 0, unknown names are skipped.
    pub fn proc_num(&self, selection: impl Into<NodeSelection>) -> i64 {
        let names: Vec<String> = match selection.into() {
            NodeSelection::All => return self.nodes.values().map(Node::active_processors).sum(),
            NodeSelection::One(name) => vec![name],
            NodeSelection::Many(names) => names,
        };

        names
            .iter()
            .filter_map(|name| {
                let node = self.nodes.get(name.as_str());
                if node.is_none() {
                    self.emitter.emit(Level::Info, &format!("proc_num: node {} doesn't exist", name));
                }
                node
            })
            .map(Node::active_processors)
            .sum()
    }

    /// Standing reservation slots open to `queue`, or of every reservation if `queue` is `None`.
    ///
    /// Each host of a reservation contributes the reservation's `nbprocs` to the total and
    /// its `used_slots` to the used count.
    pub fn queue_slots(&self, queue: Option<&str>) -> SlotCounts {
        let (total, used) = self
            .reservations
            .values()
            .filter(|reservation| queue.is_none_or(|queue| reservation.serves_queue(queue)))
            .fold((0, 0), |(total, used), reservation| {
                (total + reservation.nbprocs * reservation.host_count(), used + reservation.used_slots * reservation.host_count())
            });

        match queue {
            Some(queue) => self.emitter.emit(Level::Info, &format!("Queue {}: SDJ slots total={}, used={}", queue, total, used)),
            None => self.emitter.emit(Level::Info, &format!("Configured SDJ slots: total={}, used={}", total, used)),
        }

        SlotCounts::new(total, used)
    }

    pub fn reservations(&self) -> &ReservationMap {
        &self.reservations
    }

    pub fn reservation(&self, name: &str) -> Option<&Reservation> {
        self.reservations.get(name)
    }

    pub fn active_node_index(&self) -> &ActiveNodes {
        &self.active_nodes
    }

    /// Collects every figure of the model. With `queue`, only that queue gets a slot entry.
    pub fn report(&self, queue: Option<&str>) -> CapacityReport {
        let queue_names: Vec<&str> = match queue {
            Some(queue) => vec![queue],
            None => self.queue_names(),
        };

        CapacityReport {
            server: self.server.clone(),
            scheduler_version: self.scheduler_version.clone(),
            node_count: self.nodes.len(),
            active_node_count: self.active_nodes.len(),
            active_procs: self.proc_num(NodeSelection::All),
            total_used_slots: self.total_used_slots(),
            reservation_slots: self.queue_slots(None),
            queue_slots: queue_names.into_iter().map(|name| (name.to_string(), self.queue_slots(Some(name)))).collect(),
        }
    }
}
