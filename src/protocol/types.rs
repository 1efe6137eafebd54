//! Protocol definitions as they appear in the suite, and the flat process
//! specs they resolve into.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::OptionMap;

/// Where the processes of a protocol run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionType {
    /// Pinned to the client and server hosts of the test tool
    #[default]
    Distributed,
    /// One instance on every host
    Standalone,
}

/// Test-tool host a distributed process is pinned to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostRole {
    Client,
    Server,
}

impl fmt::Display for HostRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostRole::Client => f.write_str("client"),
            HostRole::Server => f.write_str("server"),
        }
    }
}

/// Protocol section entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolDefinition {
    #[serde(rename = "type", default)]
    pub execution: ExecutionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    /// Rendered as `--key=value` flags
    #[serde(default)]
    pub args: OptionMap,
    /// Verbatim arguments appended after the flags
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Program per version
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub versions: BTreeMap<String, String>,
    /// Config file, relative to the suite directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,
    /// Time the processes get to come up before the test tool starts
    #[serde(default = "default_startup_delay", with = "humantime_serde")]
    pub startup_delay: Duration,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub iterations: Vec<ProtocolIteration>,
}

fn default_startup_delay() -> Duration {
    Duration::from_secs(1)
}

/// One process of a protocol; unset fields are inherited from the definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolIteration {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<HostRole>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    /// Merged over the definition's args, key by key
    #[serde(default)]
    pub args: OptionMap,
    /// Appended to the definition's extra args
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// A resolved process template, ready to be bound to hosts
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessSpec {
    pub name: String,
    pub protocol: String,
    pub execution: ExecutionType,
    /// `None` for standalone processes
    pub role: Option<HostRole>,
    pub program: String,
    /// May still contain `{placeholders}`
    pub args: Vec<String>,
    pub config: Option<PathBuf>,
    pub version: Option<String>,
    #[serde(with = "humantime_serde")]
    pub startup_delay: Duration,
}
