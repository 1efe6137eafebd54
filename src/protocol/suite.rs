//! Protocol suite manager.
//!
//! Resolves protocol definitions into flat [`ProcessSpec`]s and binds those
//! to the hosts of a built network.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use log::{debug, warn};

use super::types::{ExecutionType, HostRole, ProcessSpec, ProtocolDefinition, ProtocolIteration};
use crate::config_loader::{DocumentSource, Section};
use crate::error::{ConfigError, ProtocolConfigError};
use crate::isolation::ExecutionContext;
use crate::network::{BuiltNetwork, ProcessCommand};
use crate::utils::{self, template, Vars};

/// Hosts and timing of the test tool a protocol is run against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoints {
    pub client_host: usize,
    pub server_host: usize,
    pub duration: Duration,
}

/// A process spec pinned to a host, with placeholders expanded
#[derive(Debug, Clone, PartialEq)]
pub struct BoundProcess {
    pub name: String,
    pub host: usize,
    pub command: ProcessCommand,
}

/// Values for the placeholders available to protocol and tool commands
pub fn placeholder_vars(
    network: &BuiltNetwork<'_>,
    endpoints: &Endpoints,
    context: &ExecutionContext,
    log_dir: &Path,
) -> Vars {
    let addr = |host: usize| {
        network
            .host_addr(host)
            .map(|a| a.to_string())
            .unwrap_or_default()
    };
    let mut vars = Vars::new();
    vars.insert("client_ip", addr(endpoints.client_host));
    vars.insert("server_ip", addr(endpoints.server_host));
    vars.insert("port", context.port_base.to_string());
    vars.insert("tool_port", context.port(1).unwrap_or(context.port_base).to_string());
    vars.insert("log_dir", log_dir.display().to_string());
    vars.insert("scratch_dir", context.scratch_dir.display().to_string());
    vars.insert("duration", endpoints.duration.as_secs().max(1).to_string());
    vars
}

/// Resolves and binds protocol definitions from one document source
pub struct ProtocolSuiteManager<'a> {
    source: &'a dyn DocumentSource,
}

impl<'a> ProtocolSuiteManager<'a> {
    pub fn new(source: &'a dyn DocumentSource) -> Self {
        Self { source }
    }

    /// Look up protocol `name` and resolve it into process specs
    pub fn resolve(&self, name: &str) -> Result<Vec<ProcessSpec>, ProtocolConfigError> {
        let value = self
            .source
            .resolve(name, Section::Protocol)
            .map_err(|e| match e {
                ConfigError::Missing { .. } => ProtocolConfigError::Missing(name.to_string()),
                other => ProtocolConfigError::Malformed {
                    protocol: name.to_string(),
                    reason: other.to_string(),
                },
            })?;
        let definition: ProtocolDefinition =
            serde_yaml::from_value(value).map_err(|e| ProtocolConfigError::Malformed {
                protocol: name.to_string(),
                reason: e.to_string(),
            })?;
        self.resolve_definition(name, &definition)
    }

    /// Flatten a definition: one spec per iteration, or one per role when
    /// the definition has no iterations
    pub fn resolve_definition(
        &self,
        name: &str,
        definition: &ProtocolDefinition,
    ) -> Result<Vec<ProcessSpec>, ProtocolConfigError> {
        let iterations = if definition.iterations.is_empty() {
            implicit_iterations(name, definition.execution)
        } else {
            definition.iterations.clone()
        };

        let mut seen = HashSet::new();
        let mut specs = Vec::with_capacity(iterations.len());
        for iteration in &iterations {
            utils::validate_name(&iteration.name).map_err(|reason| ProtocolConfigError::Invalid {
                protocol: name.to_string(),
                reason: format!("iteration name: {}", reason),
            })?;
            if !seen.insert(iteration.name.as_str()) {
                return Err(ProtocolConfigError::Invalid {
                    protocol: name.to_string(),
                    reason: format!("iteration '{}' is declared twice", iteration.name),
                });
            }
            specs.push(self.resolve_iteration(name, definition, iteration)?);
        }

        debug!("Protocol '{}' resolved into {} process spec(s)", name, specs.len());
        Ok(specs)
    }

    fn resolve_iteration(
        &self,
        protocol: &str,
        definition: &ProtocolDefinition,
        iteration: &ProtocolIteration,
    ) -> Result<ProcessSpec, ProtocolConfigError> {
        let root = self.source.root();
        let execution = iteration.execution.unwrap_or(definition.execution);

        let role = match execution {
            ExecutionType::Distributed => Some(iteration.role.ok_or_else(|| ProtocolConfigError::Invalid {
                protocol: protocol.to_string(),
                reason: format!("distributed iteration '{}' needs a role", iteration.name),
            })?),
            ExecutionType::Standalone => {
                if iteration.role.is_some() {
                    warn!(
                        "Protocol '{}': role of standalone iteration '{}' is ignored",
                        protocol, iteration.name
                    );
                }
                None
            }
        };

        let version = iteration.version.clone().or_else(|| definition.version.clone());
        let versioned = match &version {
            Some(v) => Some(definition.versions.get(v).ok_or_else(|| {
                ProtocolConfigError::UnknownVersion {
                    protocol: protocol.to_string(),
                    version: v.clone(),
                }
            })?),
            None => None,
        };
        let program = iteration
            .program
            .as_ref()
            .or(versioned)
            .or(definition.program.as_ref())
            .ok_or_else(|| ProtocolConfigError::Invalid {
                protocol: protocol.to_string(),
                reason: format!("no program for iteration '{}'", iteration.name),
            })?;
        let program = utils::resolve_program(program, root).map_err(|e| ProtocolConfigError::Invalid {
            protocol: protocol.to_string(),
            reason: e.to_string(),
        })?;

        let config = match iteration.config.as_ref().or(definition.config.as_ref()) {
            Some(reference) => {
                let path = utils::resolve_file(reference, root).map_err(|e| ProtocolConfigError::Invalid {
                    protocol: protocol.to_string(),
                    reason: e.to_string(),
                })?;
                if !path.is_file() {
                    return Err(ProtocolConfigError::MissingConfig {
                        protocol: protocol.to_string(),
                        path,
                    });
                }
                Some(path)
            }
            None => None,
        };

        let options = utils::merge_options(&definition.args, &iteration.args);
        let mut args = utils::options_to_args(&options);
        args.extend(definition.extra_args.iter().cloned());
        args.extend(iteration.extra_args.iter().cloned());
        if config.is_some() && !template::mentions(&args, "config") {
            args.push("--config={config}".to_string());
        }

        Ok(ProcessSpec {
            name: iteration.name.clone(),
            protocol: protocol.to_string(),
            execution,
            role,
            program,
            args,
            config,
            version,
            startup_delay: definition.startup_delay,
        })
    }

    /// Pin specs to hosts and expand their placeholders.
    ///
    /// Distributed specs land on the client or server host of `endpoints`,
    /// standalone specs on every host (named `{name}-h{index}`).
    pub fn bind(
        &self,
        specs: &[ProcessSpec],
        endpoints: &Endpoints,
        network: &BuiltNetwork<'_>,
        context: &ExecutionContext,
        log_dir: &Path,
    ) -> Vec<BoundProcess> {
        let base = placeholder_vars(network, endpoints, context, log_dir);
        let mut bound = Vec::new();

        for spec in specs {
            let placements: Vec<(String, usize)> = match spec.role {
                Some(HostRole::Client) => vec![(spec.name.clone(), endpoints.client_host)],
                Some(HostRole::Server) => vec![(spec.name.clone(), endpoints.server_host)],
                None => (0..network.host_count())
                    .map(|host| (format!("{}-h{}", spec.name, host), host))
                    .collect(),
            };

            for (name, host) in placements {
                let mut vars = base.clone();
                vars.insert("host", network.host_name(host).unwrap_or_default().to_string());
                vars.insert(
                    "host_ip",
                    network.host_addr(host).map(|a| a.to_string()).unwrap_or_default(),
                );
                if let Some(config) = &spec.config {
                    vars.insert("config", config.display().to_string());
                }

                let mut command = ProcessCommand::new(spec.program.clone())
                    .args(template::expand_all(&spec.args, &vars))
                    .log_to(log_dir.join(format!("{}.log", name)));
                command.env = context.env();
                bound.push(BoundProcess { name, host, command });
            }
        }
        bound
    }
}

fn implicit_iterations(protocol: &str, execution: ExecutionType) -> Vec<ProtocolIteration> {
    let iteration = |name: String, role: Option<HostRole>| ProtocolIteration {
        name,
        role,
        execution: None,
        program: None,
        args: Default::default(),
        extra_args: Vec::new(),
        config: None,
        version: None,
    };
    match execution {
        ExecutionType::Distributed => vec![
            iteration(format!("{}-server", protocol), Some(HostRole::Server)),
            iteration(format!("{}-client", protocol), Some(HostRole::Client)),
        ],
        ExecutionType::Standalone => vec![iteration(protocol.to_string(), None)],
    }
}
