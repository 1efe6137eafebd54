//! Test case planning.
//!
//! Everything that can be checked without touching the substrate is checked
//! here, so configuration problems surface before any network is built.

use std::collections::HashSet;

use log::{info, warn};
use regex::Regex;

use crate::config::{ExecutionMode, GeneralConfig, TestCaseConfig, ToolConfig};
use crate::config_loader::{self, DocumentSource, Section};
use crate::error::ConfigError;
use crate::protocol::{ProcessSpec, ProtocolSuiteManager};
use crate::topology::{RoutingStrategy, TopologyResolver, TopologyTemplate, VariantExpander};
use crate::utils;

/// A protocol with its resolved process specs
#[derive(Debug, Clone)]
pub struct ProtocolPlan {
    pub name: String,
    pub specs: Vec<ProcessSpec>,
}

/// A test tool with host references and programs resolved
#[derive(Debug, Clone)]
pub struct ResolvedTool {
    pub name: String,
    pub config: ToolConfig,
    pub client_host: usize,
    pub server_host: usize,
    pub client_program: String,
    pub server_program: Option<String>,
    pub metric: Option<Regex>,
}

/// Validated description of everything one test case will run
#[derive(Debug, Clone)]
pub struct CasePlan {
    pub test_case: String,
    pub template: TopologyTemplate,
    pub strategy: RoutingStrategy,
    pub mode: ExecutionMode,
    pub protocols: Vec<ProtocolPlan>,
    pub tools: Vec<ResolvedTool>,
}

impl CasePlan {
    pub fn variant_count(&self) -> usize {
        VariantExpander::new(&self.template).len()
    }

    pub fn runs_per_variant(&self) -> usize {
        self.protocols.len() * self.tools.len()
    }
}

/// Resolve test case `test_case`, optionally narrowed to one tool
pub fn plan_case(
    source: &dyn DocumentSource,
    general: &GeneralConfig,
    test_case: &str,
    selected_tool: Option<&str>,
) -> Result<CasePlan, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidTestCase {
        name: test_case.to_string(),
        reason,
    };

    utils::validate_name(test_case).map_err(invalid)?;
    let case: TestCaseConfig = config_loader::load(source, test_case, Section::TestCase)?;

    if case.protocols.is_empty() {
        return Err(invalid("no protocols listed".to_string()));
    }
    if case.tools.is_empty() {
        return Err(invalid("no tools listed".to_string()));
    }
    for name in case.protocols.iter().chain(&case.tools) {
        utils::validate_name(name).map_err(invalid)?;
    }
    if let Some(dup) = first_duplicate(&case.protocols) {
        return Err(invalid(format!("protocol '{}' is listed twice", dup)));
    }
    if let Some(dup) = first_duplicate(&case.tools) {
        return Err(invalid(format!("tool '{}' is listed twice", dup)));
    }

    let template = TopologyResolver::new(source).resolve(&case.topology)?;

    if !case.routing.supports(template.kind) {
        return Err(invalid(format!(
            "routing strategy {} cannot be used with the {} topology '{}'",
            case.routing, template.kind, template.name
        )));
    }
    if case.routing == RoutingStrategy::DynamicConverging && general.routing.daemon.is_none() {
        return Err(invalid(
            "dynamic_converging routing needs general.routing.daemon".to_string(),
        ));
    }

    let tool_names: Vec<&String> = match selected_tool {
        Some(selected) => {
            let tool = case
                .tools
                .iter()
                .find(|t| t.as_str() == selected)
                .ok_or_else(|| invalid(format!("tool '{}' is not part of this test case", selected)))?;
            vec![tool]
        }
        None => case.tools.iter().collect(),
    };

    let tools = tool_names
        .into_iter()
        .map(|name| resolve_tool(source, name, template.nodes))
        .collect::<Result<Vec<_>, _>>()?;

    let suite = ProtocolSuiteManager::new(source);
    let mut protocols = Vec::with_capacity(case.protocols.len());
    for name in &case.protocols {
        protocols.push(ProtocolPlan {
            name: name.clone(),
            specs: suite.resolve(name)?,
        });
    }

    let plan = CasePlan {
        test_case: test_case.to_string(),
        template,
        strategy: case.routing,
        mode: case.mode,
        protocols,
        tools,
    };
    info!(
        "Planned '{}': {} variant(s) x {} protocol(s) x {} tool(s), {:?} mode, {}",
        plan.test_case,
        plan.variant_count(),
        plan.protocols.len(),
        plan.tools.len(),
        plan.mode,
        plan.strategy
    );
    Ok(plan)
}

fn resolve_tool(source: &dyn DocumentSource, name: &str, nodes: usize) -> Result<ResolvedTool, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidTool {
        name: name.to_string(),
        reason,
    };

    let config: ToolConfig = config_loader::load(source, name, Section::Tool)?;
    if config.duration.is_zero() {
        return Err(invalid("duration must be greater than zero".to_string()));
    }

    let client_host = utils::resolve_host_ref(&config.client_host, nodes).map_err(invalid)?;
    let server_host = utils::resolve_host_ref(&config.server_host, nodes).map_err(invalid)?;
    if client_host == server_host {
        warn!("Tool '{}': client and server share host h{}", name, client_host);
    }

    let client_program =
        utils::resolve_program(&config.client.program, source.root()).map_err(|e| invalid(e.to_string()))?;
    let server_program = match &config.server {
        Some(server) => {
            Some(utils::resolve_program(&server.program, source.root()).map_err(|e| invalid(e.to_string()))?)
        }
        None => None,
    };

    let metric = match &config.metric_pattern {
        Some(pattern) => {
            let regex = Regex::new(pattern).map_err(|e| invalid(format!("metric_pattern: {}", e)))?;
            if !regex.capture_names().any(|group| group == Some("value")) {
                return Err(invalid("metric_pattern needs a named group 'value'".to_string()));
            }
            Some(regex)
        }
        None => None,
    };

    Ok(ResolvedTool {
        name: name.to_string(),
        config,
        client_host,
        server_host,
        client_program,
        server_program,
        metric,
    })
}

fn first_duplicate(names: &[String]) -> Option<&str> {
    let mut seen = HashSet::new();
    names.iter().find(|n| !seen.insert(n.as_str())).map(String::as_str)
}
