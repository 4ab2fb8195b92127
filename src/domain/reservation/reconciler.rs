use log::Level;

use crate::domain::node::ActiveNodes;
use crate::domain::reservation::reservation::Reservation;
use crate::domain::utils::emitter::DiagnosticEmitter;
use crate::domain::utils::id::NodeName;

/// Brings a reservation in line with the live node state.
///
/// Hosts that are not active are removed from the host list and the claimed processor
/// count is capped to the active processors of the remaining hosts. Reapplying to an
/// already reconciled reservation changes nothing.
pub struct Reconciler<'a> {
    active_nodes: &'a ActiveNodes,
    emitter: &'a dyn DiagnosticEmitter,
}

impl<'a> Reconciler<'a> {
    pub fn new(active_nodes: &'a ActiveNodes, emitter: &'a dyn DiagnosticEmitter) -> Self {
        Reconciler { active_nodes, emitter }
    }

    /// Replaces the host list of `reservation` with the active subset of `raw_hosts`
    /// and clamps `nbprocs`. Each raw host is trimmed of surrounding whitespace.
    pub fn apply<'h>(&self, reservation: &mut Reservation, raw_hosts: impl IntoIterator<Item = &'h str>) {
        let mut hostlist = Vec::new();
        for host in raw_hosts.into_iter().map(str::trim) {
            if self.active_nodes.contains(host) {
                hostlist.push(NodeName::new(host));
            } else {
                self.emitter.emit(Level::Info, &format!("Reservation {}: inactive node {} removed", reservation.name, host));
            }
        }
        reservation.hostlist = hostlist;

        let active_procs = self.active_procs(&reservation.hostlist);
        if active_procs < reservation.nbprocs {
            self.emitter.emit(
                Level::Info,
                &format!("Reservation {}: number of procs reduced to total number of procs on active nodes ({})", reservation.name, active_procs),
            );
            reservation.nbprocs = active_procs;
        }
    }

    /// Reconciles a reservation against its own host list.
    pub fn reapply(&self, reservation: &mut Reservation) {
        let hosts: Vec<String> = reservation.hostlist.iter().map(|host| host.to_string()).collect();
        self.apply(reservation, hosts.iter().map(String::as_str));
    }

    /// Sum of active processors over `hostlist`. A host listed twice counts twice.
    pub fn active_procs(&self, hostlist: &[NodeName]) -> i64 {
        hostlist.iter().filter_map(|host| self.active_nodes.active_processors(host.as_str())).sum()
    }
}
