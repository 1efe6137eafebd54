//! Per-case state machine.
//!
//! ```text
//! Pending -> BuildingTopology -> StartingProtocols -> RunningTestTools -> CollectingResults
//!                  |                    |                                   |   |   |
//!                  +--------------------+---------> CollectingResults       |   |   +-> Succeeded | Failed
//!                                                                           |   +-> BuildingTopology (next variant)
//!                                                                           +-> StartingProtocols (next run)
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use log::debug;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseState {
    Pending,
    BuildingTopology,
    StartingProtocols,
    RunningTestTools,
    CollectingResults,
    Succeeded,
    Failed,
}

impl CaseState {
    pub fn can_advance_to(self, next: CaseState) -> bool {
        use CaseState::*;
        matches!(
            (self, next),
            (Pending, BuildingTopology)
                | (BuildingTopology, StartingProtocols)
                | (BuildingTopology, CollectingResults)
                | (StartingProtocols, RunningTestTools)
                | (StartingProtocols, CollectingResults)
                | (RunningTestTools, CollectingResults)
                | (CollectingResults, StartingProtocols)
                | (CollectingResults, BuildingTopology)
                | (CollectingResults, Succeeded)
                | (CollectingResults, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, CaseState::Succeeded | CaseState::Failed)
    }
}

impl fmt::Display for CaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CaseState::Pending => "pending",
            CaseState::BuildingTopology => "building-topology",
            CaseState::StartingProtocols => "starting-protocols",
            CaseState::RunningTestTools => "running-test-tools",
            CaseState::CollectingResults => "collecting-results",
            CaseState::Succeeded => "succeeded",
            CaseState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("test case '{test_case}': illegal transition {from} -> {to}")]
pub struct InvalidTransition {
    pub test_case: String,
    pub from: CaseState,
    pub to: CaseState,
}

/// Current state of a case plus the path that led there
#[derive(Debug, Clone)]
pub struct CaseTracker {
    test_case: String,
    state: CaseState,
    history: Vec<(CaseState, DateTime<Utc>)>,
}

impl CaseTracker {
    pub fn new(test_case: &str) -> Self {
        Self {
            test_case: test_case.to_string(),
            state: CaseState::Pending,
            history: vec![(CaseState::Pending, Utc::now())],
        }
    }

    pub fn state(&self) -> CaseState {
        self.state
    }

    pub fn history(&self) -> impl Iterator<Item = CaseState> + '_ {
        self.history.iter().map(|(state, _)| *state)
    }

    /// Move to `next` if the transition is legal
    pub fn advance(&mut self, next: CaseState) -> Result<(), InvalidTransition> {
        if !self.state.can_advance_to(next) {
            return Err(InvalidTransition {
                test_case: self.test_case.clone(),
                from: self.state,
                to: next,
            });
        }
        debug!("{}: {} -> {}", self.test_case, self.state, next);
        self.state = next;
        self.history.push((next, Utc::now()));
        Ok(())
    }
}
