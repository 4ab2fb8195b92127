pub mod capacity_source;
pub mod diagnose;
pub mod pbs_cli_source;
pub mod snapshot_file_source;
