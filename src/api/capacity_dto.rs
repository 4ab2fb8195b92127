use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Server, node and queue state as returned by the resource manager.
///
/// The field names follow the PBS JSON output (`pbsnodes -a -F json`), so the
/// node part of a live query deserializes straight into this type.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CapacitySnapshotDto {
    #[serde(default)]
    pub pbs_server: Option<String>,
    pub pbs_version: String,
    pub nodes: BTreeMap<String, NodeDto>,
    #[serde(default, alias = "Queue")]
    pub queues: BTreeMap<String, QueueDto>,
}

/// Root of `pbsnodes -a -F json`.
#[derive(Debug, Deserialize)]
pub struct PbsnodesDto {
    #[serde(default)]
    pub pbs_server: Option<String>,
    #[serde(default)]
    pub pbs_version: Option<String>,
    #[serde(default)]
    pub nodes: BTreeMap<String, NodeDto>,
}

/// Root of `qstat -B -f -F json`.
#[derive(Debug, Deserialize)]
pub struct QstatServerDto {
    #[serde(default)]
    pub pbs_version: Option<String>,
    #[serde(rename = "Server", default)]
    pub servers: BTreeMap<String, ServerDto>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ServerDto {
    #[serde(default)]
    pub pbs_version: Option<String>,
    #[serde(flatten)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl QstatServerDto {
    /// Version reported for `server`, else the first server listed, else the output header.
    pub fn version_of(&self, server: &str) -> Option<String> {
        self.servers
            .get(server)
            .or_else(|| self.servers.values().next())
            .and_then(|info| info.pbs_version.clone())
            .or_else(|| self.pbs_version.clone())
    }
}

/// Root of `qstat -Q -f -F json`.
#[derive(Debug, Deserialize)]
pub struct QstatQueuesDto {
    #[serde(rename = "Queue", default)]
    pub queues: BTreeMap<String, QueueDto>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NodeDto {
    /// Torque reports `"offline,down"`, PBS Pro a list of tags.
    #[serde(default)]
    pub state: ListOrStringDto,

    /// Configured processors. Torque calls it `np`, PBS Pro `pcpus`.
    #[serde(default, alias = "pcpus")]
    pub np: Option<CountDto>,

    /// One entry per processor allocated to a job.
    #[serde(default)]
    pub jobs: Option<ListOrStringDto>,

    /// Captures every other node attribute
    #[serde(flatten)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct QueueDto {
    #[serde(flatten)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum ListOrStringDto {
    List(Vec<String>),
    Joined(String),
}

impl Default for ListOrStringDto {
    fn default() -> Self {
        ListOrStringDto::List(Vec::new())
    }
}

impl ListOrStringDto {
    /// Splits the comma-separated form and drops empty entries.
    pub fn into_items(self) -> Vec<String> {
        match self {
            ListOrStringDto::List(items) => items.into_iter().map(|item| item.trim().to_string()).filter(|item| !item.is_empty()).collect(),
            ListOrStringDto::Joined(joined) => joined.split(',').map(str::trim).filter(|item| !item.is_empty()).map(String::from).collect(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum CountDto {
    Number(i64),
    Text(String),
}

impl CountDto {
    /// The count as a non-negative integer.
    pub fn value(&self) -> Result<i64> {
        let count = match self {
            CountDto::Number(number) => *number,
            CountDto::Text(text) => text
                .trim()
                .parse::<i64>()
                .map_err(|e| Error::MalformedCapacitySource(format!("processor count '{}' is not an integer: {}", text, e)))?,
        };

        if count < 0 {
            return Err(Error::MalformedCapacitySource(format!("processor count {} is negative", count)));
        }
        Ok(count)
    }
}
