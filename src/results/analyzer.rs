//! Hand-off of finished case directories to an external analyzer.

use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, warn};

use crate::config::CommandConfig;

/// What the analyzer reported; never affects the case verdict
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalyzerStatus {
    Completed,
    Failed(String),
    Skipped,
}

/// Summarizes a case results directory
pub trait ResultsAnalyzer: Send + Sync {
    fn analyze(&self, case_dir: &Path) -> AnalyzerStatus;
}

/// Analyzer that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAnalyzer;

impl ResultsAnalyzer for NoopAnalyzer {
    fn analyze(&self, _case_dir: &Path) -> AnalyzerStatus {
        AnalyzerStatus::Skipped
    }
}

/// Runs an external program with the case directory as its last argument
#[derive(Debug, Clone)]
pub struct CommandAnalyzer {
    command: CommandConfig,
    working_dir: PathBuf,
}

impl CommandAnalyzer {
    pub fn new(command: CommandConfig, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            command,
            working_dir: working_dir.into(),
        }
    }
}

impl ResultsAnalyzer for CommandAnalyzer {
    fn analyze(&self, case_dir: &Path) -> AnalyzerStatus {
        debug!("Running analyzer {} on {}", self.command.program, case_dir.display());
        let output = Command::new(&self.command.program)
            .args(&self.command.args)
            .arg(case_dir)
            .current_dir(&self.working_dir)
            .output();

        match output {
            Ok(output) if output.status.success() => AnalyzerStatus::Completed,
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                warn!("Analyzer exited with {}: {}", output.status, stderr.trim());
                AnalyzerStatus::Failed(format!("exit status {}", output.status))
            }
            Err(e) => {
                warn!("Could not start analyzer {}: {}", self.command.program, e);
                AnalyzerStatus::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_skips() {
        assert_eq!(NoopAnalyzer.analyze(Path::new("/nowhere")), AnalyzerStatus::Skipped);
    }

    #[test]
    fn test_missing_program_fails_softly() {
        let analyzer = CommandAnalyzer::new(
            CommandConfig {
                program: "/nonexistent/analyzer".to_string(),
                args: Vec::new(),
            },
            ".",
        );
        assert!(matches!(analyzer.analyze(Path::new(".")), AnalyzerStatus::Failed(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_receives_case_dir() {
        let dir = tempfile::tempdir().unwrap();
        let analyzer = CommandAnalyzer::new(
            CommandConfig {
                program: "test".to_string(),
                args: vec!["-d".to_string()],
            },
            dir.path(),
        );
        assert_eq!(analyzer.analyze(dir.path()), AnalyzerStatus::Completed);
        assert!(matches!(
            analyzer.analyze(&dir.path().join("missing")),
            AnalyzerStatus::Failed(_)
        ));
    }
}
