use std::path::PathBuf;

use crate::api::config_dto::CapacityConfigDto;
use crate::domain::rms::capacity_source::CapacitySource;
use crate::domain::rms::diagnose::DiagnoseSource;
use crate::domain::rms::pbs_cli_source::PbsCliSource;
use crate::domain::rms::snapshot_file_source::SnapshotFileSource;
use crate::error::{Error, Result};

/// Resolved settings of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapacityConfig {
    pub server: String,
    pub verbosity: u8,
    pub diag_output_file: Option<PathBuf>,
    pub snapshot_file: Option<PathBuf>,
    pub queue: Option<String>,
}

impl CapacityConfig {
    pub fn new(server: impl Into<String>) -> Self {
        CapacityConfig { server: server.into(), verbosity: 0, diag_output_file: None, snapshot_file: None, queue: None }
    }

    /// The snapshot file when one is configured, the live server otherwise.
    pub fn capacity_source(&self) -> Box<dyn CapacitySource> {
        match &self.snapshot_file {
            Some(path) => Box::new(SnapshotFileSource::new(path.clone())),
            None => Box::new(PbsCliSource::default()),
        }
    }

    /// The captured diagnose output when one is configured, `diagnose -r` otherwise.
    pub fn diagnose_source(&self) -> DiagnoseSource {
        match &self.diag_output_file {
            Some(path) => DiagnoseSource::File(path.clone()),
            None => DiagnoseSource::command(self.server.clone()),
        }
    }
}

impl TryFrom<CapacityConfigDto> for CapacityConfig {
    type Error = Error;

    fn try_from(dto: CapacityConfigDto) -> Result<Self> {
        let server = dto.server.filter(|server| !server.trim().is_empty()).ok_or_else(|| Error::ConfigurationError("no PBS server specified".to_string()))?;

        Ok(CapacityConfig {
            server,
            verbosity: dto.verbosity.unwrap_or(0),
            diag_output_file: dto.diag_output_file.map(PathBuf::from),
            snapshot_file: dto.snapshot_file.map(PathBuf::from),
            queue: dto.queue,
        })
    }
}
