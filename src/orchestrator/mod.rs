//! Test orchestration.
//!
//! The [`Orchestrator`] drives one planned test case through its variants:
//! build the network, start the protocol processes of each run, run the test
//! tool, collect results, tear down. Sequential cases run every
//! (protocol, tool) pair in order on one execution context. Parallel cases
//! give each protocol its own lane and context and join all lanes before the
//! next variant is built.

pub mod plan;
pub mod runner;
pub mod state;

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use rayon::prelude::*;

use crate::config::{ExecutionMode, GeneralConfig};
use crate::config_loader::DocumentSource;
use crate::error::{FailureRecord, OrchestrationError, RunError};
use crate::isolation::{ExecutionContext, IsolationProvider};
use crate::network::{BuiltNetwork, NetworkBuilder, Pid, ProcessCommand, Substrate};
use crate::protocol::{placeholder_vars, Endpoints, ProtocolSuiteManager};
use crate::results::{extract_metrics, CaseReport, Metrics, ResultsCollector, RunOutcome, RunRecord};
use crate::topology::{TopologyVariant, VariantExpander};
use crate::utils::{template, Vars};

pub use plan::{plan_case, CasePlan, ProtocolPlan, ResolvedTool};
pub use runner::{RunReport, Runner};
pub use state::{CaseState, CaseTracker, InvalidTransition};

/// Runs planned test cases against one substrate
pub struct Orchestrator<'a> {
    substrate: &'a dyn Substrate,
    isolation: &'a dyn IsolationProvider,
    general: &'a GeneralConfig,
    suite: ProtocolSuiteManager<'a>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        source: &'a dyn DocumentSource,
        substrate: &'a dyn Substrate,
        isolation: &'a dyn IsolationProvider,
        general: &'a GeneralConfig,
    ) -> Self {
        Self {
            substrate,
            isolation,
            general,
            suite: ProtocolSuiteManager::new(source),
        }
    }

    /// Execute every variant of `plan` and aggregate the verdict.
    ///
    /// Failures of individual runs are recorded in the report; only problems
    /// with the results directory itself abort with an error.
    pub fn execute(&self, plan: &CasePlan, collector: &ResultsCollector) -> Result<CaseReport, OrchestrationError> {
        let started_at = Utc::now();
        let case_dir = collector
            .begin_case(&plan.test_case)
            .map_err(|source| OrchestrationError::Workspace {
                path: collector.case_dir(&plan.test_case),
                source,
            })?;

        let expander = VariantExpander::new(&plan.template);
        for variant in &expander {
            collector
                .write_topology(&plan.test_case, &variant)
                .map_err(|source| OrchestrationError::Workspace {
                    path: collector.topology_dir(&plan.test_case, variant.ordinal),
                    source,
                })?;
        }

        info!(
            "Running test case '{}' over {} topology variant(s)",
            plan.test_case,
            expander.len()
        );

        let mut tracker = CaseTracker::new(&plan.test_case);
        let mut runs = Vec::with_capacity(expander.len() * plan.runs_per_variant());
        let mut aborted = false;

        for variant in &expander {
            advance(&mut tracker, CaseState::BuildingTopology);
            if self.run_variant(plan, &variant, collector, &mut tracker, &mut runs) {
                aborted = true;
                warn!(
                    "{}: aborting after topology-{} because abort_on_first_failure is set",
                    plan.test_case, variant.ordinal
                );
                break;
            }
        }

        let success = runs.iter().all(RunRecord::passed);
        advance(
            &mut tracker,
            if success {
                CaseState::Succeeded
            } else {
                CaseState::Failed
            },
        );

        let report = CaseReport {
            test_case: plan.test_case.clone(),
            success,
            aborted,
            variants: expander.len(),
            started_at,
            finished_at: Utc::now(),
            result_dir: case_dir.clone(),
            runs,
        };
        collector
            .finish_case(&report)
            .map_err(|source| OrchestrationError::Workspace { path: case_dir, source })?;
        Ok(report)
    }

    /// Build one variant and run all its combinations. Returns true when the
    /// case must stop here.
    fn run_variant(
        &self,
        plan: &CasePlan,
        variant: &TopologyVariant,
        collector: &ResultsCollector,
        tracker: &mut CaseTracker,
        runs: &mut Vec<RunRecord>,
    ) -> bool {
        let lanes = match plan.mode {
            ExecutionMode::Sequential => 1,
            ExecutionMode::Parallel => plan.protocols.len(),
        };

        let contexts = match self.isolation.allocate(lanes) {
            Ok(contexts) => contexts,
            Err(e) => {
                error!("{}: topology-{}: {}", plan.test_case, variant.ordinal, e);
                advance(tracker, CaseState::CollectingResults);
                return self.fail_all(plan, variant.ordinal, collector, runs, &RunError::from(e));
            }
        };

        let label = format!("{}-topology-{}", plan.test_case, variant.ordinal);
        let builder = NetworkBuilder::new(self.substrate, &self.general.routing);
        let stop = match builder.build(&label, variant, plan.strategy) {
            Ok(network) => {
                let stop = match plan.mode {
                    ExecutionMode::Sequential => {
                        self.run_sequential(plan, &network, &contexts[0], collector, tracker, runs)
                    }
                    ExecutionMode::Parallel => self.run_parallel(plan, &network, &contexts, collector, tracker, runs),
                };
                if let Err(e) = network.teardown() {
                    warn!("{}: teardown failed: {}", label, e);
                }
                stop
            }
            Err(e) => {
                error!("{}: {}", label, e);
                advance(tracker, CaseState::CollectingResults);
                self.fail_all(plan, variant.ordinal, collector, runs, &RunError::from(e))
            }
        };

        for context in contexts {
            self.isolation.release(context);
        }
        stop
    }

    fn run_sequential(
        &self,
        plan: &CasePlan,
        network: &BuiltNetwork<'_>,
        context: &ExecutionContext,
        collector: &ResultsCollector,
        tracker: &mut CaseTracker,
        runs: &mut Vec<RunRecord>,
    ) -> bool {
        for protocol in &plan.protocols {
            for tool in &plan.tools {
                let started_at = Utc::now();
                let run_dir = collector.run_dir(&plan.test_case, network.ordinal(), &protocol.name, &tool.name);
                let result = self.execute_run(tool, protocol, network, context, &run_dir, &mut |state: CaseState| {
                    advance(tracker, state)
                });
                advance(tracker, CaseState::CollectingResults);

                let record = self.record(
                    collector,
                    plan,
                    network.ordinal(),
                    protocol,
                    tool,
                    Some(context),
                    started_at,
                    result,
                );
                let failed = !record.passed();
                runs.push(record);
                if failed && self.general.abort_on_first_failure {
                    return true;
                }
            }
        }
        false
    }

    fn run_parallel(
        &self,
        plan: &CasePlan,
        network: &BuiltNetwork<'_>,
        contexts: &[ExecutionContext],
        collector: &ResultsCollector,
        tracker: &mut CaseTracker,
        runs: &mut Vec<RunRecord>,
    ) -> bool {
        advance(tracker, CaseState::StartingProtocols);
        advance(tracker, CaseState::RunningTestTools);

        let lanes = || -> Vec<Vec<RunRecord>> {
            plan.protocols
                .par_iter()
                .zip(contexts.par_iter())
                .map(|(protocol, context)| {
                    debug!("Lane {} runs protocol {}", context.label, protocol.name);
                    plan.tools
                        .iter()
                        .map(|tool| {
                            let started_at = Utc::now();
                            let run_dir =
                                collector.run_dir(&plan.test_case, network.ordinal(), &protocol.name, &tool.name);
                            let result = self.execute_run(tool, protocol, network, context, &run_dir, &mut |_: CaseState| {});
                            self.record(
                                collector,
                                plan,
                                network.ordinal(),
                                protocol,
                                tool,
                                Some(context),
                                started_at,
                                result,
                            )
                        })
                        .collect::<Vec<_>>()
                })
                .collect()
        };

        let batch = match rayon::ThreadPoolBuilder::new()
            .num_threads(contexts.len())
            .thread_name(|i| format!("netsweep-lane-{}", i))
            .build()
        {
            Ok(pool) => pool.install(lanes),
            Err(e) => {
                warn!("Cannot create lane pool ({}), using the global pool", e);
                lanes()
            }
        };
        advance(tracker, CaseState::CollectingResults);

        let before = runs.len();
        runs.extend(batch.into_iter().flatten());
        let failed = runs[before..].iter().any(|r| !r.passed());
        failed && self.general.abort_on_first_failure
    }

    /// One (protocol, tool) run on a built network
    fn execute_run(
        &self,
        tool: &ResolvedTool,
        protocol: &ProtocolPlan,
        network: &BuiltNetwork<'_>,
        context: &ExecutionContext,
        run_dir: &Path,
        phase: &mut dyn FnMut(CaseState),
    ) -> Result<Option<Metrics>, RunError> {
        let substrate = network.substrate();
        let endpoints = Endpoints {
            client_host: tool.client_host,
            server_host: tool.server_host,
            duration: tool.config.duration,
        };

        phase(CaseState::StartingProtocols);
        fs::create_dir_all(run_dir)?;
        let mut group = ProcessGroup::new(substrate);

        let bound = self.suite.bind(&protocol.specs, &endpoints, network, context, run_dir);
        for process in bound {
            let pid = substrate.start_process(network.handle(), process.host, &process.command)?;
            debug!("{}: started {} as {}", network.label(), process.name, pid);
            group.push(process.name, pid);
        }

        let startup = protocol
            .specs
            .iter()
            .map(|spec| spec.startup_delay)
            .max()
            .unwrap_or_default();
        if !startup.is_zero() {
            thread::sleep(startup);
        }
        group.check_alive()?;

        phase(CaseState::RunningTestTools);
        let vars = placeholder_vars(network, &endpoints, context, run_dir);

        if let (Some(server), Some(program)) = (&tool.config.server, &tool.server_program) {
            let command = tool_command(
                program,
                &server.args,
                &vars,
                context,
                run_dir.join(format!("{}-server.log", tool.name)),
            );
            let pid = substrate.start_process(network.handle(), tool.server_host, &command)?;
            group.push(format!("{}-server", tool.name), pid);
        }

        let client_log = run_dir.join(format!("{}-client.log", tool.name));
        let command = tool_command(
            &tool.client_program,
            &tool.config.client.args,
            &vars,
            context,
            client_log.clone(),
        );
        info!(
            "{}: {} / {} on h{}: {}",
            network.label(),
            protocol.name,
            tool.name,
            tool.client_host,
            command.command_line()
        );
        let client = substrate.start_process(network.handle(), tool.client_host, &command)?;

        let limit = tool.config.time_limit();
        match substrate.wait_process(client, limit)? {
            None => {
                if let Err(e) = substrate.stop_process(client) {
                    debug!("Stopping timed out client {}: {}", client, e);
                }
                return Err(RunError::ToolTimeout {
                    tool: tool.name.clone(),
                    limit,
                });
            }
            Some(exit) if !exit.success() => {
                return Err(RunError::ToolFailed {
                    tool: tool.name.clone(),
                    code: exit.code,
                });
            }
            Some(_) => {}
        }
        group.stop_all();

        match &tool.metric {
            Some(pattern) => Ok(Some(extract_metrics(pattern, &client_log)?)),
            None => Ok(None),
        }
    }

    /// Turn a run result into a record and persist it
    #[allow(clippy::too_many_arguments)]
    fn record(
        &self,
        collector: &ResultsCollector,
        plan: &CasePlan,
        ordinal: usize,
        protocol: &ProtocolPlan,
        tool: &ResolvedTool,
        context: Option<&ExecutionContext>,
        started_at: DateTime<Utc>,
        result: Result<Option<Metrics>, RunError>,
    ) -> RunRecord {
        let (outcome, metrics) = match result {
            Ok(metrics) => {
                info!(
                    "{}: topology-{} {}/{} passed",
                    plan.test_case, ordinal, protocol.name, tool.name
                );
                (RunOutcome::Passed, metrics)
            }
            Err(e) => {
                warn!(
                    "{}: topology-{} {}/{} failed: {}",
                    plan.test_case, ordinal, protocol.name, tool.name, e
                );
                (RunOutcome::Failed(FailureRecord::from(&e)), None)
            }
        };

        let mut record = RunRecord {
            test_case: plan.test_case.clone(),
            topology: ordinal,
            protocol: protocol.name.clone(),
            tool: tool.name.clone(),
            context: context.map(|c| c.label.clone()),
            started_at,
            finished_at: Utc::now(),
            outcome,
            metrics,
            result_dir: collector.run_dir(&plan.test_case, ordinal, &protocol.name, &tool.name),
        };
        persist(collector, &mut record);
        record
    }

    /// Record every planned run of a variant as failed by `cause`
    fn fail_all(
        &self,
        plan: &CasePlan,
        ordinal: usize,
        collector: &ResultsCollector,
        runs: &mut Vec<RunRecord>,
        cause: &RunError,
    ) -> bool {
        let failure = FailureRecord::from(cause);
        let now = Utc::now();
        for protocol in &plan.protocols {
            for tool in &plan.tools {
                let mut record = RunRecord {
                    test_case: plan.test_case.clone(),
                    topology: ordinal,
                    protocol: protocol.name.clone(),
                    tool: tool.name.clone(),
                    context: None,
                    started_at: now,
                    finished_at: now,
                    outcome: RunOutcome::Failed(failure.clone()),
                    metrics: None,
                    result_dir: collector.run_dir(&plan.test_case, ordinal, &protocol.name, &tool.name),
                };
                persist(collector, &mut record);
                runs.push(record);
            }
        }
        self.general.abort_on_first_failure
    }
}

fn persist(collector: &ResultsCollector, record: &mut RunRecord) {
    if let Err(e) = collector.record_run(record) {
        error!("Cannot record run in {}: {}", record.result_dir.display(), e);
        record.outcome = RunOutcome::Failed(FailureRecord::from(&RunError::Results(e)));
    }
}

fn advance(tracker: &mut CaseTracker, next: CaseState) {
    if let Err(e) = tracker.advance(next) {
        warn!("{}", e);
    }
}

fn tool_command(program: &str, args: &[String], vars: &Vars, context: &ExecutionContext, log: PathBuf) -> ProcessCommand {
    let mut command = ProcessCommand::new(template::expand(program, vars))
        .args(template::expand_all(args, vars))
        .log_to(log);
    command.env = context.env();
    command
}

/// Processes of one run; whatever is still running is stopped on drop
struct ProcessGroup<'s> {
    substrate: &'s dyn Substrate,
    processes: Vec<(String, Pid)>,
}

impl<'s> ProcessGroup<'s> {
    fn new(substrate: &'s dyn Substrate) -> Self {
        Self {
            substrate,
            processes: Vec::new(),
        }
    }

    fn push(&mut self, name: String, pid: Pid) {
        self.processes.push((name, pid));
    }

    /// Fail with `ProcessCrash` if any member already exited
    fn check_alive(&self) -> Result<(), RunError> {
        for (name, pid) in &self.processes {
            if let Some(exit) = self.substrate.poll_process(*pid)? {
                return Err(RunError::ProcessCrash {
                    process: name.clone(),
                    code: exit.code,
                });
            }
        }
        Ok(())
    }

    /// Stop members in reverse start order
    fn stop_all(&mut self) {
        while let Some((name, pid)) = self.processes.pop() {
            if let Err(e) = self.substrate.stop_process(pid) {
                debug!("Stopping {} ({}): {}", name, pid, e);
            }
        }
    }
}

impl Drop for ProcessGroup<'_> {
    fn drop(&mut self) {
        self.stop_all();
    }
}
