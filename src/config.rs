//! Typed descriptors for every section of a suite document.
//!
//! These are the shapes the configuration loader hands to the engine. The
//! topology and protocol descriptors are normalized further by the resolver
//! and the suite manager; tools and test cases are used as they are.

use crate::topology::{LinkAttribute, RoutingStrategy, TopologyKind};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Suite-wide settings (`general:` section)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Workspace holding `test_results/`; the CLI flag wins when given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace: Option<PathBuf>,
    /// Stop a test case after the first failed run
    pub abort_on_first_failure: bool,
    pub routing: RoutingConfig,
    pub isolation: IsolationConfig,
    /// External summarization step run on each finished case directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analyzer: Option<CommandConfig>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            workspace: None,
            abort_on_first_failure: false,
            routing: RoutingConfig::default(),
            isolation: IsolationConfig::default(),
            analyzer: None,
        }
    }
}

impl GeneralConfig {
    /// Validate the general settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.routing.convergence_timeout.is_zero() {
            return Err(ConfigError::InvalidGeneral(
                "routing.convergence_timeout must be greater than zero".to_string(),
            ));
        }
        if self.routing.poll_interval.is_zero() {
            return Err(ConfigError::InvalidGeneral(
                "routing.poll_interval must be greater than zero".to_string(),
            ));
        }
        if self.isolation.max_contexts == 0 {
            return Err(ConfigError::InvalidGeneral(
                "isolation.max_contexts must be at least 1".to_string(),
            ));
        }
        if self.isolation.ports_per_context < 2 {
            return Err(ConfigError::InvalidGeneral(
                "isolation.ports_per_context must be at least 2".to_string(),
            ));
        }
        if let Some(daemon) = &self.routing.daemon {
            if daemon.program.trim().is_empty() {
                return Err(ConfigError::InvalidGeneral(
                    "routing.daemon.program cannot be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Dynamic routing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Upper bound on waiting for a dynamic routing daemon to converge
    #[serde(with = "humantime_serde")]
    pub convergence_timeout: Duration,
    /// How often the substrate is asked whether routing converged
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Daemon started on every host for `dynamic_converging`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daemon: Option<CommandConfig>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            convergence_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(500),
            daemon: None,
        }
    }
}

/// Limits for the local isolation layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IsolationConfig {
    pub max_contexts: usize,
    pub port_base: u16,
    pub ports_per_context: u16,
}

impl Default for IsolationConfig {
    fn default() -> Self {
        Self {
            max_contexts: 8,
            port_base: 20000,
            ports_per_context: 100,
        }
    }
}

/// An external program with its arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Value of a protocol option, rendered as a command-line flag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Number(serde_yaml::Number),
    String(String),
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Bool(b) => write!(f, "{}", b),
            OptionValue::Number(n) => write!(f, "{}", n),
            OptionValue::String(s) => f.write_str(s),
        }
    }
}

/// Topology section entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyDescriptor {
    #[serde(rename = "type")]
    pub kind: TopologyKind,
    pub nodes: usize,
    /// Swept link attributes, outermost first (linear and mesh)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sweep: Vec<SweepDescriptor>,
    /// Square 0/1 matrix (custom)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adjacency: Option<Vec<Vec<u8>>>,
    /// Values for attributes that are not swept
    #[serde(default)]
    pub link: LinkDescriptor,
}

/// One swept attribute
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepDescriptor {
    pub attribute: LinkAttribute,
    /// Baseline per link; a scalar is a one-element sequence
    pub init: Baseline,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Baseline {
    Single(f64),
    PerLink(Vec<f64>),
}

impl Baseline {
    pub fn into_values(self) -> Vec<f64> {
        match self {
            Baseline::Single(v) => vec![v],
            Baseline::PerLink(values) => values,
        }
    }
}

/// Uniform link parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkDescriptor {
    /// Packet loss in percent
    pub loss: f64,
    /// One-way delay in milliseconds
    pub latency: f64,
    /// Delay variation in milliseconds
    pub jitter: f64,
    /// Mbit/s from the lower to the higher numbered host
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bandwidth_forward: Option<f64>,
    /// Mbit/s in the opposite direction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bandwidth_backward: Option<f64>,
}

/// Test tool section entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Host running the client side (`h<index>`, `first` or `last`)
    #[serde(default = "default_client_host")]
    pub client_host: String,
    /// Host running the server side
    #[serde(default = "default_server_host")]
    pub server_host: String,
    pub client: CommandConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<CommandConfig>,
    /// Expected run time of the client
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    /// Extra time allowed past `duration` before the client is killed
    #[serde(default = "default_grace", with = "humantime_serde")]
    pub grace: Duration,
    /// Regex with a `value` group, applied to the client log
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_pattern: Option<String>,
}

impl ToolConfig {
    /// Total window granted to the client process
    pub fn time_limit(&self) -> Duration {
        self.duration + self.grace
    }
}

fn default_client_host() -> String {
    "first".to_string()
}

fn default_server_host() -> String {
    "last".to_string()
}

fn default_grace() -> Duration {
    Duration::from_secs(5)
}

/// How the (protocol, tool) combinations of one variant are executed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Sequential,
    Parallel,
}

/// Test case section entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCaseConfig {
    pub topology: String,
    #[serde(default)]
    pub routing: RoutingStrategy,
    pub tools: Vec<String>,
    pub protocols: Vec<String>,
    #[serde(default)]
    pub mode: ExecutionMode,
}

/// Optional per-key overrides, kept sorted for stable argument order
pub type OptionMap = BTreeMap<String, OptionValue>;
