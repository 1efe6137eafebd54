//! Case summary generation.
//!
//! Generates both JSON and human-readable text summaries.

use std::fs;
use std::io;
use std::path::Path;

use super::{CaseReport, RunOutcome};

/// Write `summary.json`
pub fn write_json_summary(report: &CaseReport, output_path: &Path) -> io::Result<()> {
    let json = serde_json::to_string_pretty(report).map_err(io::Error::other)?;
    fs::write(output_path, json)?;
    log::debug!("JSON summary written to {}", output_path.display());
    Ok(())
}

/// Render the text summary
pub fn render_text_summary(report: &CaseReport) -> String {
    let mut lines: Vec<String> = Vec::new();

    // Header
    lines.push("=".repeat(80));
    lines.push(format!("TEST CASE: {}", report.test_case));
    lines.push("=".repeat(80));
    lines.push(String::new());

    lines.push(format!("Verdict: {}", if report.success { "SUCCESS" } else { "FAILED" }));
    if report.aborted {
        lines.push("Aborted after the first failure".to_string());
    }
    lines.push(format!("Started: {}", report.started_at.to_rfc3339()));
    lines.push(format!("Finished: {}", report.finished_at.to_rfc3339()));
    lines.push(format!("Topology variants: {}", report.variants));
    lines.push(format!(
        "Runs: {} ({} passed, {} failed)",
        report.runs.len(),
        report.passed(),
        report.failed()
    ));
    lines.push(String::new());

    lines.push("-".repeat(80));
    lines.push(format!("{:<14} {:<18} {:<18} {}", "TOPOLOGY", "PROTOCOL", "TOOL", "OUTCOME"));
    lines.push("-".repeat(80));
    for run in &report.runs {
        let outcome = match &run.outcome {
            RunOutcome::Passed => match run.metrics.as_ref().and_then(|m| m.value) {
                Some(value) => format!("passed (metric {})", value),
                None => "passed".to_string(),
            },
            RunOutcome::Failed(failure) => {
                format!("FAILED [{:?}] {}", failure.kind, failure.message)
            }
        };
        lines.push(format!(
            "{:<14} {:<18} {:<18} {}",
            format!("topology-{}", run.topology),
            run.protocol,
            run.tool,
            outcome
        ));
    }

    // Footer
    lines.push("=".repeat(80));
    lines.join("\n") + "\n"
}

/// Write `summary.txt`
pub fn write_text_summary(report: &CaseReport, output_path: &Path) -> io::Result<()> {
    fs::write(output_path, render_text_summary(report))?;
    log::debug!("Text summary written to {}", output_path.display());
    Ok(())
}

/// Print a short summary to stdout
pub fn print_summary(report: &CaseReport) {
    println!("\n=== {} ===", report.test_case);
    println!("Verdict: {}", if report.success { "SUCCESS" } else { "FAILED" });
    println!("Variants: {}", report.variants);
    println!("Runs: {} passed, {} failed", report.passed(), report.failed());
    for run in report.runs.iter().filter(|r| !r.passed()) {
        if let Some(failure) = run.failure() {
            println!(
                "  topology-{} {}/{}: {}",
                run.topology, run.protocol, run.tool, failure.message
            );
        }
    }
    println!("Results: {}", report.result_dir.display());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FailureKind, FailureRecord};
    use crate::results::RunRecord;
    use chrono::Utc;
    use std::path::PathBuf;

    #[test]
    fn test_text_summary_lists_runs() {
        let now = Utc::now();
        let run = |topology: usize, outcome: RunOutcome| RunRecord {
            test_case: "case".to_string(),
            topology,
            protocol: "tcp".to_string(),
            tool: "ping".to_string(),
            context: None,
            started_at: now,
            finished_at: now,
            outcome,
            metrics: None,
            result_dir: PathBuf::from("/r"),
        };
        let report = CaseReport {
            test_case: "case".to_string(),
            success: false,
            aborted: false,
            variants: 2,
            started_at: now,
            finished_at: now,
            result_dir: PathBuf::from("/r"),
            runs: vec![
                run(0, RunOutcome::Passed),
                run(
                    1,
                    RunOutcome::Failed(FailureRecord {
                        kind: FailureKind::ToolTimeout,
                        message: "test tool 'ping' did not finish".to_string(),
                    }),
                ),
            ],
        };

        let text = render_text_summary(&report);
        assert!(text.contains("Verdict: FAILED"));
        assert!(text.contains("Runs: 2 (1 passed, 1 failed)"));
        assert!(text.contains("FAILED [ToolTimeout]"));
    }
}
