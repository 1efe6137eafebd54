//! In-memory substrate.
//!
//! `SimSubstrate` keeps networks and processes as plain records and lets the
//! caller script how programs behave. It backs the test-suite and the
//! `--substrate sim` dry-run mode of the CLI.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, trace};

use super::substrate::{LinkSpec, NetworkHandle, NetworkSpec, Pid, ProcessCommand, ProcessExit, Substrate};
use crate::error::SubstrateError;
use crate::topology::{LinkParams, RouteEntry};

/// Scripted behaviour of a program
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProcessBehavior {
    /// Exit with `code` once `after` has elapsed
    Exit { after: Duration, code: i32 },
    /// Exit immediately with `code`
    Crash { code: i32 },
    /// Keep running until stopped or torn down
    #[default]
    RunUntilStopped,
}

/// Entry of the substrate journal
#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    NetworkCreated { handle: NetworkHandle, label: String, hosts: usize },
    LinkAdded { handle: NetworkHandle, a: usize, b: usize, params: LinkParams },
    RoutesApplied { handle: NetworkHandle, entries: usize },
    ProcessStarted { handle: NetworkHandle, label: String, host: usize, pid: Pid, command: ProcessCommand },
    ProcessStopped { pid: Pid },
    TornDown { handle: NetworkHandle, label: String },
}

#[derive(Debug)]
struct SimNetwork {
    label: String,
    created_at: Instant,
}

#[derive(Debug)]
struct SimProcess {
    network: NetworkHandle,
    started_at: Instant,
    behavior: ProcessBehavior,
    exit: Option<ProcessExit>,
}

#[derive(Debug, Default)]
struct SimState {
    next_handle: u64,
    next_pid: Pid,
    networks: HashMap<NetworkHandle, SimNetwork>,
    processes: HashMap<Pid, SimProcess>,
    events: Vec<SimEvent>,
}

/// Substrate that only records what it is asked to do
#[derive(Debug, Default)]
pub struct SimSubstrate {
    behaviors: BTreeMap<String, ProcessBehavior>,
    outputs: BTreeMap<String, String>,
    converge_after: Duration,
    never_converge: BTreeSet<String>,
    failing_networks: BTreeSet<String>,
    state: Mutex<SimState>,
}

impl SimSubstrate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script `program` (full string or file name)
    pub fn with_behavior(mut self, program: impl Into<String>, behavior: ProcessBehavior) -> Self {
        self.behaviors.insert(program.into(), behavior);
        self
    }

    /// Text `program` writes to its log file when started
    pub fn with_output(mut self, program: impl Into<String>, output: impl Into<String>) -> Self {
        self.outputs.insert(program.into(), output.into());
        self
    }

    /// Report convergence only once a network is at least this old
    pub fn converge_after(mut self, delay: Duration) -> Self {
        self.converge_after = delay;
        self
    }

    /// Never report convergence for the network labelled `label`
    pub fn never_converge(mut self, label: impl Into<String>) -> Self {
        self.never_converge.insert(label.into());
        self
    }

    /// Refuse to create the network labelled `label`
    pub fn fail_network(mut self, label: impl Into<String>) -> Self {
        self.failing_networks.insert(label.into());
        self
    }

    /// Snapshot of the journal
    pub fn events(&self) -> Vec<SimEvent> {
        self.lock().events.clone()
    }

    /// Networks that were created and not yet torn down
    pub fn live_networks(&self) -> usize {
        self.lock().networks.len()
    }

    /// Processes that have not exited
    pub fn running_processes(&self) -> usize {
        let mut state = self.lock();
        let now = Instant::now();
        let mut running = 0;
        for process in state.processes.values_mut() {
            if Self::refresh(process, now).is_none() {
                running += 1;
            }
        }
        running
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        // a panicking test thread must not hide the journal from the others
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lookup<'m, T>(map: &'m BTreeMap<String, T>, program: &str) -> Option<&'m T> {
        map.get(program).or_else(|| {
            Path::new(program)
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| map.get(name))
        })
    }

    fn refresh(process: &mut SimProcess, now: Instant) -> Option<ProcessExit> {
        if process.exit.is_none() {
            if let ProcessBehavior::Exit { after, code } = process.behavior {
                if now.duration_since(process.started_at) >= after {
                    process.exit = Some(ProcessExit { code: Some(code) });
                }
            }
        }
        process.exit
    }
}

impl Substrate for SimSubstrate {
    fn create_network(&self, spec: &NetworkSpec) -> Result<NetworkHandle, SubstrateError> {
        if self.failing_networks.contains(&spec.label) {
            return Err(SubstrateError::Rejected(format!(
                "network '{}' cannot be created",
                spec.label
            )));
        }

        let mut state = self.lock();
        let handle = NetworkHandle(state.next_handle);
        state.next_handle += 1;
        state.networks.insert(
            handle,
            SimNetwork {
                label: spec.label.clone(),
                created_at: Instant::now(),
            },
        );
        state.events.push(SimEvent::NetworkCreated {
            handle,
            label: spec.label.clone(),
            hosts: spec.hosts.len(),
        });
        debug!("sim: created {} '{}' with {} hosts", handle, spec.label, spec.hosts.len());
        Ok(handle)
    }

    fn add_link(&self, network: NetworkHandle, link: &LinkSpec) -> Result<(), SubstrateError> {
        let mut state = self.lock();
        if !state.networks.contains_key(&network) {
            return Err(SubstrateError::UnknownNetwork(network.0));
        }
        state.events.push(SimEvent::LinkAdded {
            handle: network,
            a: link.a,
            b: link.b,
            params: link.params,
        });
        Ok(())
    }

    fn apply_routes(&self, network: NetworkHandle, routes: &[RouteEntry]) -> Result<(), SubstrateError> {
        let mut state = self.lock();
        if !state.networks.contains_key(&network) {
            return Err(SubstrateError::UnknownNetwork(network.0));
        }
        state.events.push(SimEvent::RoutesApplied {
            handle: network,
            entries: routes.len(),
        });
        Ok(())
    }

    fn routes_converged(&self, network: NetworkHandle) -> Result<bool, SubstrateError> {
        let state = self.lock();
        let net = state
            .networks
            .get(&network)
            .ok_or(SubstrateError::UnknownNetwork(network.0))?;
        if self.never_converge.contains(&net.label) {
            return Ok(false);
        }
        Ok(net.created_at.elapsed() >= self.converge_after)
    }

    fn start_process(
        &self,
        network: NetworkHandle,
        host: usize,
        command: &ProcessCommand,
    ) -> Result<Pid, SubstrateError> {
        if let Some(path) = &command.log_path {
            let output = Self::lookup(&self.outputs, &command.program)
                .map(String::as_str)
                .unwrap_or("");
            fs::write(path, output)?;
        }

        let behavior = Self::lookup(&self.behaviors, &command.program)
            .copied()
            .unwrap_or_default();

        let mut state = self.lock();
        let label = state
            .networks
            .get(&network)
            .map(|net| net.label.clone())
            .ok_or(SubstrateError::UnknownNetwork(network.0))?;

        state.next_pid += 1;
        let pid = state.next_pid;
        let exit = match behavior {
            ProcessBehavior::Crash { code } => Some(ProcessExit { code: Some(code) }),
            _ => None,
        };
        state.processes.insert(
            pid,
            SimProcess {
                network,
                started_at: Instant::now(),
                behavior,
                exit,
            },
        );
        state.events.push(SimEvent::ProcessStarted {
            handle: network,
            label,
            host,
            pid,
            command: command.clone(),
        });
        trace!("sim: pid {} on h{}: {}", pid, host, command.command_line());
        Ok(pid)
    }

    fn poll_process(&self, pid: Pid) -> Result<Option<ProcessExit>, SubstrateError> {
        let mut state = self.lock();
        let process = state
            .processes
            .get_mut(&pid)
            .ok_or(SubstrateError::UnknownProcess(pid))?;
        Ok(Self::refresh(process, Instant::now()))
    }

    fn stop_process(&self, pid: Pid) -> Result<(), SubstrateError> {
        let mut state = self.lock();
        let process = state
            .processes
            .get_mut(&pid)
            .ok_or(SubstrateError::UnknownProcess(pid))?;
        if Self::refresh(process, Instant::now()).is_none() {
            process.exit = Some(ProcessExit { code: None });
            state.events.push(SimEvent::ProcessStopped { pid });
        }
        Ok(())
    }

    fn teardown(&self, network: NetworkHandle) -> Result<(), SubstrateError> {
        let mut state = self.lock();
        let net = state
            .networks
            .remove(&network)
            .ok_or(SubstrateError::UnknownNetwork(network.0))?;

        let now = Instant::now();
        let mut stopped = Vec::new();
        for (&pid, process) in state.processes.iter_mut() {
            if process.network == network && Self::refresh(process, now).is_none() {
                process.exit = Some(ProcessExit { code: None });
                stopped.push(pid);
            }
        }
        stopped.sort_unstable();
        for pid in stopped {
            state.events.push(SimEvent::ProcessStopped { pid });
        }
        state.events.push(SimEvent::TornDown {
            handle: network,
            label: net.label.clone(),
        });
        debug!("sim: tore down {} '{}'", network, net.label);
        Ok(())
    }
}
