use std::collections::BTreeSet;

use serde::Serialize;

use crate::domain::utils::id::{NodeName, QueueName, ReservationName};

/// A standing reservation recovered from `diagnose -r`.
///
/// Only records whose five attribute lines were all matched are ever exposed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reservation {
    pub name: ReservationName,
    /// Job classes allowed by the ACL. Compared by name with the resource manager queues.
    pub queues: BTreeSet<QueueName>,
    /// Processors claimed by the reservation, capped to what its active hosts offer.
    pub nbprocs: i64,
    /// Reserved hosts, inactive ones already removed.
    pub hostlist: Vec<NodeName>,
    /// Slots in use, taken from a trailing WARNING line. 0 when none was found.
    pub used_slots: i64,
}

impl Reservation {
    pub fn new(name: ReservationName) -> Self {
        Reservation { name, queues: BTreeSet::new(), nbprocs: 0, hostlist: Vec::new(), used_slots: 0 }
    }

    pub fn serves_queue(&self, queue: &str) -> bool {
        self.queues.contains(queue)
    }

    pub fn host_count(&self) -> i64 {
        self.hostlist.len() as i64
    }
}
