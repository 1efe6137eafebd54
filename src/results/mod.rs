//! Results collection.
//!
//! Every run owns one directory:
//!
//! ```text
//! {workspace}/test_results/{test}/
//!     summary.json
//!     summary.txt
//!     topology-{n}/
//!         topology_description.txt
//!         {protocol}/{tool}/
//!             run.json
//!             metrics.json
//!             *.log
//! ```

pub mod analyzer;
pub mod markers;
pub mod metrics;
pub mod report;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::FailureRecord;
use crate::topology::TopologyVariant;

pub use analyzer::{AnalyzerStatus, CommandAnalyzer, NoopAnalyzer, ResultsAnalyzer};
pub use markers::{write_verdict_markers, FAILED_MARKER, SUCCESS_MARKER};
pub use metrics::{extract_metrics, Metrics};

/// Name of the directory holding all case directories
pub const RESULTS_DIR: &str = "test_results";

pub const TOPOLOGY_DESCRIPTION: &str = "topology_description.txt";

/// Pass/fail outcome of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Passed,
    Failed(FailureRecord),
}

/// Everything recorded about one (variant, protocol, tool) run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub test_case: String,
    pub topology: usize,
    pub protocol: String,
    pub tool: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: RunOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Metrics>,
    pub result_dir: PathBuf,
}

impl RunRecord {
    pub fn passed(&self) -> bool {
        matches!(self.outcome, RunOutcome::Passed)
    }

    pub fn failure(&self) -> Option<&FailureRecord> {
        match &self.outcome {
            RunOutcome::Failed(record) => Some(record),
            RunOutcome::Passed => None,
        }
    }
}

/// Aggregated outcome of one test case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseReport {
    pub test_case: String,
    /// True iff no run failed
    pub success: bool,
    /// Stopped early by `abort_on_first_failure`
    pub aborted: bool,
    pub variants: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub result_dir: PathBuf,
    pub runs: Vec<RunRecord>,
}

impl CaseReport {
    pub fn passed(&self) -> usize {
        self.runs.iter().filter(|r| r.passed()).count()
    }

    pub fn failed(&self) -> usize {
        self.runs.len() - self.passed()
    }
}

/// Lays out and writes result artifacts under one workspace
#[derive(Debug, Clone)]
pub struct ResultsCollector {
    root: PathBuf,
}

impl ResultsCollector {
    pub fn new(workspace: &Path) -> Self {
        Self {
            root: workspace.join(RESULTS_DIR),
        }
    }

    /// `{workspace}/test_results`
    pub fn results_root(&self) -> &Path {
        &self.root
    }

    pub fn case_dir(&self, test_case: &str) -> PathBuf {
        self.root.join(test_case)
    }

    pub fn topology_dir(&self, test_case: &str, ordinal: usize) -> PathBuf {
        self.case_dir(test_case).join(format!("topology-{}", ordinal))
    }

    pub fn run_dir(&self, test_case: &str, ordinal: usize, protocol: &str, tool: &str) -> PathBuf {
        self.topology_dir(test_case, ordinal).join(protocol).join(tool)
    }

    /// Start a case from an empty directory
    pub fn begin_case(&self, test_case: &str) -> io::Result<PathBuf> {
        let dir = self.case_dir(test_case);
        match fs::remove_dir_all(&dir) {
            Ok(()) => debug!("Removed previous results in {}", dir.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Create `topology-{n}/` and describe the variant in it
    pub fn write_topology(&self, test_case: &str, variant: &TopologyVariant) -> io::Result<PathBuf> {
        let dir = self.topology_dir(test_case, variant.ordinal);
        fs::create_dir_all(&dir)?;
        fs::write(dir.join(TOPOLOGY_DESCRIPTION), variant.describe())?;
        Ok(dir)
    }

    /// Write `run.json` (and `metrics.json` when metrics were extracted)
    pub fn record_run(&self, record: &RunRecord) -> io::Result<()> {
        fs::create_dir_all(&record.result_dir)?;
        let json = serde_json::to_string_pretty(record).map_err(io::Error::other)?;
        fs::write(record.result_dir.join("run.json"), json)?;

        if let Some(metrics) = &record.metrics {
            let json = serde_json::to_string_pretty(metrics).map_err(io::Error::other)?;
            fs::write(record.result_dir.join("metrics.json"), json)?;
        }
        Ok(())
    }

    /// Write the case-level summaries
    pub fn finish_case(&self, report: &CaseReport) -> io::Result<()> {
        report::write_json_summary(report, &report.result_dir.join("summary.json"))?;
        report::write_text_summary(report, &report.result_dir.join("summary.txt"))?;
        info!(
            "{}: {} run(s), {} failed, results in {}",
            report.test_case,
            report.runs.len(),
            report.failed(),
            report.result_dir.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use tempfile::TempDir;

    fn record(dir: &Path, outcome: RunOutcome) -> RunRecord {
        let now = Utc::now();
        RunRecord {
            test_case: "case".to_string(),
            topology: 0,
            protocol: "quic".to_string(),
            tool: "iperf".to_string(),
            context: Some("ctx-0".to_string()),
            started_at: now,
            finished_at: now,
            outcome,
            metrics: None,
            result_dir: dir.to_path_buf(),
        }
    }

    #[test]
    fn test_layout() {
        let collector = ResultsCollector::new(Path::new("/ws"));
        assert_eq!(
            collector.run_dir("case", 3, "quic", "iperf"),
            PathBuf::from("/ws/test_results/case/topology-3/quic/iperf")
        );
    }

    #[test]
    fn test_begin_case_clears_previous_results() {
        let dir = TempDir::new().unwrap();
        let collector = ResultsCollector::new(dir.path());
        let stale = collector.topology_dir("case", 9);
        fs::create_dir_all(&stale).unwrap();

        let case_dir = collector.begin_case("case").unwrap();
        assert!(case_dir.is_dir());
        assert!(!stale.exists());
    }

    #[test]
    fn test_run_json_outcome_tag() {
        let dir = TempDir::new().unwrap();
        let collector = ResultsCollector::new(dir.path());
        let failed = record(
            dir.path(),
            RunOutcome::Failed(FailureRecord {
                kind: FailureKind::ProcessCrash,
                message: "quic-server exited".to_string(),
            }),
        );
        collector.record_run(&failed).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("run.json")).unwrap()).unwrap();
        assert_eq!(json["outcome"]["status"], "failed");
        assert_eq!(json["outcome"]["kind"], "process_crash");
        assert!(!dir.path().join("metrics.json").exists());

        let back: RunRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, failed);
    }
}
