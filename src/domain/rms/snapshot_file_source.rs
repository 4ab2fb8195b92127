use std::path::PathBuf;

use crate::api::capacity_dto::CapacitySnapshotDto;
use crate::domain::rms::capacity_source::CapacitySource;
use crate::error::Result;
use crate::loader::parser::parse_json_file;

/// Replays a snapshot captured earlier, for tests and offline analysis.
#[derive(Debug, Clone)]
pub struct SnapshotFileSource {
    pub path: PathBuf,
}

impl SnapshotFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SnapshotFileSource { path: path.into() }
    }
}

impl CapacitySource for SnapshotFileSource {
    fn query(&self, server: &str) -> Result<CapacitySnapshotDto> {
        let snapshot: CapacitySnapshotDto = parse_json_file(&self.path)?;

        if let Some(snapshot_server) = snapshot.pbs_server.as_deref() {
            if snapshot_server != server {
                log::warn!("Snapshot {} was taken on server {}, not {}", self.path.display(), snapshot_server, server);
            }
        }

        Ok(snapshot)
    }
}
