//! Emulation substrate interface.
//!
//! The engine never creates hosts, links or qdiscs itself. It describes
//! what it needs through this trait and the substrate realises it: in
//! memory for tests and dry runs, or with Linux network namespaces.

use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::SubstrateError;
use crate::topology::{LinkParams, RouteEntry};

/// Process id assigned by the substrate
pub type Pid = u32;

/// Opaque reference to a network created by a substrate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetworkHandle(pub u64);

impl fmt::Display for NetworkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "net-{}", self.0)
    }
}

/// One virtual host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSpec {
    pub name: String,
    pub addr: Ipv4Addr,
}

/// Hosts of a network to create
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSpec {
    /// Unique label, used for namespace names and logs
    pub label: String,
    pub hosts: Vec<HostSpec>,
}

/// A shaped point-to-point link between two hosts
#[derive(Debug, Clone, PartialEq)]
pub struct LinkSpec {
    pub index: usize,
    pub a: usize,
    pub b: usize,
    pub a_addr: Ipv4Addr,
    pub b_addr: Ipv4Addr,
    pub prefix: u8,
    pub params: LinkParams,
}

/// A fully resolved command to run on a host
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    /// File receiving stdout and stderr
    pub log_path: Option<PathBuf>,
}

impl ProcessCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn log_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Shell-like rendering for logs
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Exit status of a finished process; `code` is `None` when killed by a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    pub code: Option<i32>,
}

impl ProcessExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Network emulation backend
pub trait Substrate: Send + Sync {
    /// Create the hosts of a network
    fn create_network(&self, spec: &NetworkSpec) -> Result<NetworkHandle, SubstrateError>;

    /// Connect two hosts and shape the link
    fn add_link(&self, network: NetworkHandle, link: &LinkSpec) -> Result<(), SubstrateError>;

    /// Install static forwarding entries
    fn apply_routes(&self, network: NetworkHandle, routes: &[RouteEntry]) -> Result<(), SubstrateError>;

    /// Whether every host can reach every other host
    fn routes_converged(&self, network: NetworkHandle) -> Result<bool, SubstrateError>;

    /// Start `command` on `host`
    fn start_process(
        &self,
        network: NetworkHandle,
        host: usize,
        command: &ProcessCommand,
    ) -> Result<Pid, SubstrateError>;

    /// Exit status if the process has finished, `None` while it runs
    fn poll_process(&self, pid: Pid) -> Result<Option<ProcessExit>, SubstrateError>;

    /// Terminate a process; stopping a finished process is not an error
    fn stop_process(&self, pid: Pid) -> Result<(), SubstrateError>;

    /// Remove the network and everything running in it
    fn teardown(&self, network: NetworkHandle) -> Result<(), SubstrateError>;

    /// Block until the process exits or `timeout` elapses
    fn wait_process(&self, pid: Pid, timeout: Duration) -> Result<Option<ProcessExit>, SubstrateError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(exit) = self.poll_process(pid)? {
                return Ok(Some(exit));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            thread::sleep((deadline - now).min(Duration::from_millis(10)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder() {
        let command = ProcessCommand::new("iperf3")
            .args(["-c", "10.255.0.2"])
            .log_to("/tmp/client.log");
        assert_eq!(command.command_line(), "iperf3 -c 10.255.0.2");
        assert_eq!(command.log_path, Some(PathBuf::from("/tmp/client.log")));
    }

    #[test]
    fn test_exit_status() {
        assert!(ProcessExit { code: Some(0) }.success());
        assert!(!ProcessExit { code: Some(2) }.success());
        assert!(!ProcessExit { code: None }.success());
    }
}
