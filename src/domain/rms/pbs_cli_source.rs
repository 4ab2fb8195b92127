use std::process::Command;

use crate::api::capacity_dto::{CapacitySnapshotDto, PbsnodesDto, QstatQueuesDto, QstatServerDto};
use crate::domain::rms::capacity_source::CapacitySource;
use crate::error::{Error, Result};

/// Queries a live server through the PBS command line tools.
#[derive(Debug, Clone)]
pub struct PbsCliSource {
    pub pbsnodes: String,
    pub qstat: String,
}

impl Default for PbsCliSource {
    fn default() -> Self {
        PbsCliSource { pbsnodes: "pbsnodes".to_string(), qstat: "qstat".to_string() }
    }
}

impl PbsCliSource {
    pub fn pbsnodes_args(server: &str) -> Vec<String> {
        vec!["-a".to_string(), "-F".to_string(), "json".to_string(), "-s".to_string(), server.to_string()]
    }

    pub fn qstat_args(server: &str) -> Vec<String> {
        vec!["-Q".to_string(), "-f".to_string(), "-F".to_string(), "json".to_string(), format!("@{}", server)]
    }

    pub fn qstat_server_args(server: &str) -> Vec<String> {
        vec!["-B".to_string(), "-f".to_string(), "-F".to_string(), "json".to_string(), server.to_string()]
    }

    /// Merges the three command outputs. The version comes from the server metadata and
    /// falls back to the `pbsnodes` header.
    pub fn assemble(server: &str, nodes: PbsnodesDto, queues: QstatQueuesDto, server_info: QstatServerDto) -> Result<CapacitySnapshotDto> {
        let pbs_version = server_info
            .version_of(server)
            .or(nodes.pbs_version)
            .ok_or_else(|| Error::MalformedCapacitySource(format!("no pbs_version reported by server {}", server)))?;

        Ok(CapacitySnapshotDto { pbs_server: nodes.pbs_server, pbs_version, nodes: nodes.nodes, queues: queues.queues })
    }

    fn parse_output<T: serde::de::DeserializeOwned>(program: &str, output: &[u8]) -> Result<T> {
        serde_json::from_slice(output).map_err(|e| Error::MalformedCapacitySource(format!("{} output: {}", program, e)))
    }

    fn run(&self, program: &str, args: &[String], server: &str) -> Result<Vec<u8>> {
        log::debug!("Running {} {}", program, args.join(" "));

        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|e| Error::CapacitySourceUnavailable { server: server.to_string(), reason: format!("failed to execute {}: {}", program, e) })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::CapacitySourceUnavailable {
                server: server.to_string(),
                reason: format!("{} terminated with exit status {}: {}", program, output.status, stderr.trim()),
            });
        }

        Ok(output.stdout)
    }
}

impl CapacitySource for PbsCliSource {
    fn query(&self, server: &str) -> Result<CapacitySnapshotDto> {
        let nodes = self.run(&self.pbsnodes, &Self::pbsnodes_args(server), server)?;
        let nodes: PbsnodesDto = Self::parse_output(&self.pbsnodes, &nodes)?;

        let queues = self.run(&self.qstat, &Self::qstat_args(server), server)?;
        let queues: QstatQueuesDto = Self::parse_output(&self.qstat, &queues)?;

        let server_info = self.run(&self.qstat, &Self::qstat_server_args(server), server)?;
        let server_info: QstatServerDto = Self::parse_output(&self.qstat, &server_info)?;

        Self::assemble(server, nodes, queues, server_info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_arguments() {
        assert_eq!(PbsCliSource::pbsnodes_args("pbs01"), vec!["-a", "-F", "json", "-s", "pbs01"]);
        assert_eq!(PbsCliSource::qstat_args("pbs01"), vec!["-Q", "-f", "-F", "json", "@pbs01"]);
        assert_eq!(PbsCliSource::qstat_server_args("pbs01"), vec!["-B", "-f", "-F", "json", "pbs01"]);
    }

    #[test]
    fn test_version_comes_from_server_metadata() {
        let nodes: PbsnodesDto = serde_json::from_str(r#"{"pbs_server": "pbs01", "nodes": {"n1": {"state": "free", "pcpus": 4}}}"#).unwrap();
        let queues: QstatQueuesDto = serde_json::from_str(r#"{"Queue": {"batch": {"queue_type": "Execution"}}}"#).unwrap();
        let server_info: QstatServerDto = serde_json::from_str(r#"{"Server": {"pbs01": {"pbs_version": "19.1.3"}}}"#).unwrap();

        let snapshot = PbsCliSource::assemble("pbs01", nodes, queues, server_info).unwrap();

        assert_eq!(snapshot.pbs_version, "19.1.3");
        assert_eq!(snapshot.pbs_server.as_deref(), Some("pbs01"));
        assert!(snapshot.nodes.contains_key("n1"));
        assert!(snapshot.queues.contains_key("batch"));
    }

    #[test]
    fn test_missing_version_is_malformed() {
        let nodes: PbsnodesDto = serde_json::from_str(r#"{"nodes": {}}"#).unwrap();
        let queues: QstatQueuesDto = serde_json::from_str("{}").unwrap();
        let server_info: QstatServerDto = serde_json::from_str("{}").unwrap();

        let result = PbsCliSource::assemble("pbs01", nodes, queues, server_info);
        assert!(matches!(result, Err(Error::MalformedCapacitySource(_))));
    }

    #[test]
    fn test_missing_command_is_fatal() {
        let source = PbsCliSource { pbsnodes: "/nonexistent/pbsnodes".to_string(), qstat: "/nonexistent/qstat".to_string() };
        let result = source.query("pbs01");

        assert!(matches!(result, Err(Error::CapacitySourceUnavailable { server, .. }) if server == "pbs01"));
    }
}
