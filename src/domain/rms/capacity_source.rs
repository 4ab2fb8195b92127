use crate::api::capacity_dto::CapacitySnapshotDto;
use crate::error::Result;

/// Supplies the node and queue state of a resource manager server.
///
/// A failing query is fatal for the whole run: no capacity view is better than a wrong one.
pub trait CapacitySource: std::fmt::Debug {
    fn query(&self, server: &str) -> Result<CapacitySnapshotDto>;
}
