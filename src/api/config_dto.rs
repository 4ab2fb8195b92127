use serde::{Deserialize, Serialize};

/// Optional JSON run configuration. Every field can be overridden on the command line.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CapacityConfigDto {
    pub server: Option<String>,
    pub verbosity: Option<u8>,
    /// Replay a captured `diagnose -r` output instead of running the command.
    pub diag_output_file: Option<String>,
    /// Replay a captured resource manager snapshot instead of querying the server.
    pub snapshot_file: Option<String>,
    pub queue: Option<String>,
}
