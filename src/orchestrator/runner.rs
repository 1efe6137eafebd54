//! Top-level entry point tying a suite, a substrate and an analyzer together.

use std::path::{Path, PathBuf};

use log::{info, warn};

use super::plan::{plan_case, CasePlan};
use super::Orchestrator;
use crate::config::GeneralConfig;
use crate::config_loader::{self, DocumentSource, Section};
use crate::error::{ConfigError, OrchestrationError};
use crate::isolation::LocalIsolation;
use crate::network::Substrate;
use crate::results::{AnalyzerStatus, CaseReport, ResultsAnalyzer, ResultsCollector};

/// Directory under the workspace holding per-context scratch directories
pub const CONTEXTS_DIR: &str = ".contexts";

/// Outcome of [`Runner::run`]
#[derive(Debug, Clone)]
pub struct RunReport {
    pub success: bool,
    pub result_dir: PathBuf,
    pub analyzer: AnalyzerStatus,
    pub report: CaseReport,
}

/// Owns everything needed to run test cases from one suite
pub struct Runner {
    source: Box<dyn DocumentSource>,
    substrate: Box<dyn Substrate>,
    analyzer: Box<dyn ResultsAnalyzer>,
    general: GeneralConfig,
    isolation: LocalIsolation,
    workspace: PathBuf,
}

impl Runner {
    /// Load the general section of `source` and prepare a runner writing
    /// into `workspace`
    pub fn new(
        source: Box<dyn DocumentSource>,
        substrate: Box<dyn Substrate>,
        analyzer: Box<dyn ResultsAnalyzer>,
        workspace: PathBuf,
    ) -> Result<Self, ConfigError> {
        let general = config_loader::load_general(source.as_ref())?;
        let isolation = LocalIsolation::new(general.isolation.clone(), workspace.join(CONTEXTS_DIR));
        Ok(Self {
            source,
            substrate,
            analyzer,
            general,
            isolation,
            workspace,
        })
    }

    pub fn general(&self) -> &GeneralConfig {
        &self.general
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// `{workspace}/test_results`
    pub fn results_root(&self) -> PathBuf {
        ResultsCollector::new(&self.workspace).results_root().to_path_buf()
    }

    /// Test cases declared in the suite, in declaration order
    pub fn test_names(&self) -> Vec<String> {
        self.source.names(Section::TestCase)
    }

    pub fn plan(&self, test_case: &str, selected_tool: Option<&str>) -> Result<CasePlan, ConfigError> {
        plan_case(self.source.as_ref(), &self.general, test_case, selected_tool)
    }

    /// Plan and execute `test_case`, then hand its results to the analyzer
    pub fn run(&self, test_case: &str, selected_tool: Option<&str>) -> Result<RunReport, OrchestrationError> {
        let plan = self.plan(test_case, selected_tool)?;
        let collector = ResultsCollector::new(&self.workspace);
        let orchestrator = Orchestrator::new(
            self.source.as_ref(),
            self.substrate.as_ref(),
            &self.isolation,
            &self.general,
        );
        let report = orchestrator.execute(&plan, &collector)?;

        let analyzer = self.analyzer.analyze(&report.result_dir);
        match &analyzer {
            AnalyzerStatus::Completed => info!("Analyzer finished for {}", report.result_dir.display()),
            AnalyzerStatus::Failed(reason) => warn!("Analyzer failed for '{}': {}", test_case, reason),
            AnalyzerStatus::Skipped => {}
        }

        Ok(RunReport {
            success: report.success,
            result_dir: report.result_dir.clone(),
            analyzer,
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_loader::YamlSource;
    use crate::network::{ProcessBehavior, SimSubstrate};
    use crate::results::NoopAnalyzer;
    use std::time::Duration;
    use tempfile::TempDir;

    const SUITE: &str = r#"
general:
  isolation:
    max_contexts: 2
topologies:
  pair:
    type: linear
    nodes: 2
protocols:
  tcp:
    program: tcp-echo
    startup_delay: 0s
tools:
  probe:
    client: { program: probe }
    duration: 50ms
    grace: 1s
tests:
  smoke:
    topology: pair
    tools: [probe]
    protocols: [tcp]
"#;

    fn runner(workspace: &Path) -> Runner {
        let substrate = SimSubstrate::new().with_behavior(
            "probe",
            ProcessBehavior::Exit {
                after: Duration::from_millis(10),
                code: 0,
            },
        );
        Runner::new(
            Box::new(YamlSource::from_yaml(SUITE, "/suite").unwrap()),
            Box::new(substrate),
            Box::new(NoopAnalyzer),
            workspace.to_path_buf(),
        )
        .unwrap()
    }

    #[test]
    fn test_run_smoke_case() {
        let dir = TempDir::new().unwrap();
        let runner = runner(dir.path());
        assert_eq!(runner.test_names(), vec!["smoke".to_string()]);
        assert_eq!(runner.general().isolation.max_contexts, 2);

        let report = runner.run("smoke", None).unwrap();
        assert!(report.success);
        assert_eq!(report.analyzer, AnalyzerStatus::Skipped);
        assert_eq!(report.result_dir, dir.path().join("test_results").join("smoke"));
        assert!(report.result_dir.join("summary.json").is_file());
    }

    #[test]
    fn test_unknown_case_is_a_config_error() {
        let dir = TempDir::new().unwrap();
        let err = runner(dir.path()).run("nope", None).unwrap_err();
        assert!(matches!(err, OrchestrationError::Config(ConfigError::Missing { .. })));
    }
}
