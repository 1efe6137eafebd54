//! Error taxonomy.
//!
//! Configuration errors abort a test case before any network is built.
//! Everything else is captured per run as a [`RunError`] and flattened into a
//! serializable [`FailureRecord`] for the results directory.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config_loader::Section;

/// Malformed or missing suite definitions.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read suite file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse suite file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("{section} '{name}' is not defined")]
    Missing { section: Section, name: String },

    #[error("malformed {section} '{name}': {source}")]
    Malformed {
        section: Section,
        name: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid general configuration: {0}")]
    InvalidGeneral(String),

    #[error("invalid topology '{name}': {reason}")]
    InvalidTopology { name: String, reason: String },

    #[error("invalid tool '{name}': {reason}")]
    InvalidTool { name: String, reason: String },

    #[error("invalid test case '{name}': {reason}")]
    InvalidTestCase { name: String, reason: String },

    #[error(transparent)]
    Protocol(#[from] ProtocolConfigError),
}

/// A protocol definition could not be resolved into process specs.
#[derive(Debug, Error)]
pub enum ProtocolConfigError {
    #[error("protocol '{0}' is not defined")]
    Missing(String),

    #[error("malformed protocol '{protocol}': {reason}")]
    Malformed { protocol: String, reason: String },

    #[error("protocol '{protocol}': config file {} not found", path.display())]
    MissingConfig { protocol: String, path: PathBuf },

    #[error("protocol '{protocol}': version '{version}' is not listed in its version table")]
    UnknownVersion { protocol: String, version: String },

    #[error("protocol '{protocol}': {reason}")]
    Invalid { protocol: String, reason: String },
}

/// Failure reported by the emulation substrate.
#[derive(Debug, Error)]
pub enum SubstrateError {
    #[error("command `{command}` failed: {reason}")]
    Command { command: String, reason: String },

    #[error("unknown network handle {0}")]
    UnknownNetwork(u64),

    #[error("unknown process {0}")]
    UnknownProcess(u32),

    #[error("substrate rejected request: {0}")]
    Rejected(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Dynamic routing did not converge inside its bounded window.
#[derive(Debug, Error)]
#[error("routing did not converge within {timeout:?}")]
pub struct RoutingConvergenceError {
    pub timeout: Duration,
}

/// A routing strategy cannot be applied to a topology shape.
#[derive(Debug, Error)]
#[error("routing strategy {strategy} cannot be used with a {kind} topology")]
pub struct UnsupportedStrategy {
    pub strategy: String,
    pub kind: String,
}

/// Errors while realizing a topology variant.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("substrate failure while building topology-{ordinal}: {source}")]
    Substrate {
        ordinal: usize,
        #[source]
        source: SubstrateError,
    },

    #[error(transparent)]
    Convergence(#[from] RoutingConvergenceError),

    #[error(transparent)]
    Strategy(#[from] UnsupportedStrategy),
}

/// The isolation layer could not provide the requested contexts.
#[derive(Debug, Error)]
#[error("cannot allocate {requested} execution context(s), {available} available: {reason}")]
pub struct ResourceExhaustedError {
    pub requested: usize,
    pub available: usize,
    pub reason: String,
}

/// Everything that can fail a single test run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    ResourceExhausted(#[from] ResourceExhaustedError),

    #[error("protocol process '{process}' exited before the test tool started (exit code {code:?})")]
    ProcessCrash { process: String, code: Option<i32> },

    #[error("test tool '{tool}' did not finish within {limit:?}")]
    ToolTimeout { tool: String, limit: Duration },

    #[error("test tool '{tool}' exited with code {code:?}")]
    ToolFailed { tool: String, code: Option<i32> },

    #[error(transparent)]
    Substrate(#[from] SubstrateError),

    #[error("failed to prepare run directory: {0}")]
    Results(#[from] std::io::Error),
}

/// Errors that stop a test case as a whole.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot prepare results directory {}: {source}", path.display())]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Serializable classification of a run failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Build,
    RoutingConvergence,
    ResourceExhausted,
    ProcessCrash,
    ToolTimeout,
    ToolFailed,
    Substrate,
    Results,
}

/// What goes into `run.json` when a run fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub kind: FailureKind,
    pub message: String,
}

impl RunError {
    pub fn kind(&self) -> FailureKind {
        match self {
            RunError::Build(BuildError::Convergence(_)) => FailureKind::RoutingConvergence,
            RunError::Build(_) => FailureKind::Build,
            RunError::ResourceExhausted(_) => FailureKind::ResourceExhausted,
            RunError::ProcessCrash { .. } => FailureKind::ProcessCrash,
            RunError::ToolTimeout { .. } => FailureKind::ToolTimeout,
            RunError::ToolFailed { .. } => FailureKind::ToolFailed,
            RunError::Substrate(_) => FailureKind::Substrate,
            RunError::Results(_) => FailureKind::Results,
        }
    }
}

impl From<&RunError> for FailureRecord {
    fn from(error: &RunError) -> Self {
        FailureRecord {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convergence_is_classified_separately_from_build() {
        let err = RunError::Build(BuildError::Convergence(RoutingConvergenceError {
            timeout: Duration::from_secs(30),
        }));
        assert_eq!(err.kind(), FailureKind::RoutingConvergence);

        let err = RunError::Build(BuildError::Substrate {
            ordinal: 2,
            source: SubstrateError::Rejected("no such device".to_string()),
        });
        assert_eq!(err.kind(), FailureKind::Build);
        assert!(err.to_string().contains("topology-2"));
    }

    #[test]
    fn test_failure_record_keeps_message() {
        let err = RunError::ToolTimeout {
            tool: "iperf".to_string(),
            limit: Duration::from_secs(12),
        };
        let record = FailureRecord::from(&err);
        assert_eq!(record.kind, FailureKind::ToolTimeout);
        assert!(record.message.contains("iperf"));

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"tool_timeout\""));
    }
}
