//! Linux network-namespace substrate.
//!
//! Every host is a namespace, every link a veth pair shaped with `tc netem`
//! on both egress sides. Requires `iproute2` and `CAP_NET_ADMIN` (or sudo).

use std::collections::HashMap;
use std::fs::File;
use std::net::Ipv4Addr;
use std::process::{Child, Command, Stdio};
use std::sync::{Mutex, MutexGuard};

use log::{debug, info, warn};

use super::substrate::{LinkSpec, NetworkHandle, NetworkSpec, Pid, ProcessCommand, ProcessExit, Substrate};
use crate::error::SubstrateError;
use crate::topology::{LinkParams, RouteEntry};

#[derive(Debug)]
struct NetnsNetwork {
    namespaces: Vec<String>,
    addrs: Vec<Ipv4Addr>,
}

#[derive(Debug)]
struct RunningChild {
    network: NetworkHandle,
    child: Child,
    exit: Option<ProcessExit>,
}

#[derive(Debug, Default)]
struct NetnsState {
    next_handle: u64,
    networks: HashMap<NetworkHandle, NetnsNetwork>,
    children: HashMap<Pid, RunningChild>,
}

/// Substrate built on `ip netns`, veth pairs and `tc netem`
#[derive(Debug)]
pub struct NetnsSubstrate {
    prefix: String,
    sudo: bool,
    state: Mutex<NetnsState>,
}

impl Default for NetnsSubstrate {
    fn default() -> Self {
        Self::new()
    }
}

impl NetnsSubstrate {
    pub fn new() -> Self {
        Self {
            prefix: format!("nsw{}", std::process::id()),
            sudo: false,
            state: Mutex::new(NetnsState::default()),
        }
    }

    /// Prefix every privileged command with `sudo`
    pub fn with_sudo(mut self, sudo: bool) -> Self {
        self.sudo = sudo;
        self
    }

    fn lock(&self) -> MutexGuard<'_, NetnsState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn command(&self, program: &str) -> Command {
        if self.sudo {
            let mut command = Command::new("sudo");
            command.arg(program);
            command
        } else {
            Command::new(program)
        }
    }

    /// Run a command to completion, failing on a non-zero exit
    fn exec(&self, program: &str, args: &[String]) -> Result<(), SubstrateError> {
        let rendered = format!("{} {}", program, args.join(" "));
        debug!("netns: {}", rendered);
        let output = self.command(program).args(args).output()?;
        if output.status.success() {
            Ok(())
        } else {
            Err(SubstrateError::Command {
                command: rendered,
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    fn ip(&self, args: &[&str]) -> Result<(), SubstrateError> {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        self.exec("ip", &args)
    }

    fn namespace(&self, handle: NetworkHandle, host: usize) -> String {
        format!("{}-{}-h{}", self.prefix, handle.0, host)
    }

    fn network_info(&self, handle: NetworkHandle) -> Result<(Vec<String>, Vec<Ipv4Addr>), SubstrateError> {
        let state = self.lock();
        let net = state
            .networks
            .get(&handle)
            .ok_or(SubstrateError::UnknownNetwork(handle.0))?;
        Ok((net.namespaces.clone(), net.addrs.clone()))
    }

    fn delete_namespaces(&self, namespaces: &[String]) {
        for ns in namespaces {
            if let Err(e) = self.ip(&["netns", "del", ns]) {
                warn!("netns: failed to delete {}: {}", ns, e);
            }
        }
    }

    fn shape(&self, ns: &str, dev: &str, params: &LinkParams, forward: bool) -> Result<(), SubstrateError> {
        let netem = netem_args(params, forward);
        if netem.is_empty() {
            return Ok(());
        }
        let mut args: Vec<String> = ["netns", "exec", ns, "tc", "qdisc", "replace", "dev", dev, "root", "netem"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        args.extend(netem);
        self.exec("ip", &args)
    }
}

/// `tc netem` arguments for one direction of a link
pub fn netem_args(params: &LinkParams, forward: bool) -> Vec<String> {
    let mut args = Vec::new();
    if params.latency_ms > 0.0 || params.jitter_ms > 0.0 {
        args.push("delay".to_string());
        args.push(format!("{}ms", params.latency_ms));
        if params.jitter_ms > 0.0 {
            args.push(format!("{}ms", params.jitter_ms));
        }
    }
    if params.loss > 0.0 {
        args.push("loss".to_string());
        args.push(format!("{}%", params.loss));
    }
    let rate = if forward { params.bw_fwd } else { params.bw_bwd };
    if let Some(rate) = rate {
        args.push("rate".to_string());
        args.push(format!("{}mbit", rate));
    }
    args
}

impl Substrate for NetnsSubstrate {
    fn create_network(&self, spec: &NetworkSpec) -> Result<NetworkHandle, SubstrateError> {
        let handle = {
            let mut state = self.lock();
            let handle = NetworkHandle(state.next_handle);
            state.next_handle += 1;
            handle
        };

        let mut namespaces = Vec::with_capacity(spec.hosts.len());
        for (index, host) in spec.hosts.iter().enumerate() {
            let ns = self.namespace(handle, index);
            let addr = format!("{}/32", host.addr);
            let created = self
                .ip(&["netns", "add", &ns])
                .and_then(|_| self.ip(&["-n", &ns, "link", "set", "lo", "up"]))
                .and_then(|_| self.ip(&["-n", &ns, "addr", "add", &addr, "dev", "lo"]));
            // the namespace may exist even when a later step failed
            namespaces.push(ns);
            if let Err(e) = created {
                self.delete_namespaces(&namespaces);
                return Err(e);
            }
        }

        info!("netns: created '{}' ({} hosts) as {}", spec.label, spec.hosts.len(), handle);
        self.lock().networks.insert(
            handle,
            NetnsNetwork {
                namespaces,
                addrs: spec.hosts.iter().map(|h| h.addr).collect(),
            },
        );
        Ok(handle)
    }

    fn add_link(&self, network: NetworkHandle, link: &LinkSpec) -> Result<(), SubstrateError> {
        let (namespaces, _) = self.network_info(network)?;
        let ns = |host: usize| {
            namespaces
                .get(host)
                .cloned()
                .ok_or_else(|| SubstrateError::Rejected(format!("host h{} is not part of {}", host, network)))
        };
        let (ns_a, ns_b) = (ns(link.a)?, ns(link.b)?);
        let dev_a = format!("v{}l{}a", network.0, link.index);
        let dev_b = format!("v{}l{}b", network.0, link.index);

        self.ip(&[
            "link", "add", &dev_a, "netns", &ns_a, "type", "veth", "peer", "name", &dev_b, "netns", &ns_b,
        ])?;
        for (ns, dev, addr) in [(&ns_a, &dev_a, link.a_addr), (&ns_b, &dev_b, link.b_addr)] {
            let cidr = format!("{}/{}", addr, link.prefix);
            self.ip(&["-n", ns, "addr", "add", &cidr, "dev", dev])?;
            self.ip(&["-n", ns, "link", "set", dev, "up"])?;
        }

        self.shape(&ns_a, &dev_a, &link.params, true)?;
        self.shape(&ns_b, &dev_b, &link.params, false)?;
        Ok(())
    }

    fn apply_routes(&self, network: NetworkHandle, routes: &[RouteEntry]) -> Result<(), SubstrateError> {
        let (namespaces, addrs) = self.network_info(network)?;
        for route in routes {
            let (Some(ns), Some(dst), Some(src)) = (
                namespaces.get(route.host),
                addrs.get(route.destination),
                addrs.get(route.host),
            ) else {
                return Err(SubstrateError::Rejected(format!(
                    "route h{} -> h{} references an unknown host",
                    route.host, route.destination
                )));
            };
            let dst = format!("{}/32", dst);
            let via = route.via.to_string();
            let src = src.to_string();
            self.ip(&["-n", ns, "route", "replace", &dst, "via", &via, "src", &src])?;
        }
        Ok(())
    }

    fn routes_converged(&self, network: NetworkHandle) -> Result<bool, SubstrateError> {
        let (namespaces, addrs) = self.network_info(network)?;
        let Some(origin) = namespaces.first() else {
            return Ok(true);
        };
        for addr in addrs.iter().skip(1) {
            let status = self
                .command("ip")
                .args(["netns", "exec"])
                .arg(origin)
                .args(["ping", "-c", "1", "-W", "1"])
                .arg(addr.to_string())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()?;
            if !status.success() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn start_process(
        &self,
        network: NetworkHandle,
        host: usize,
        command: &ProcessCommand,
    ) -> Result<Pid, SubstrateError> {
        let (namespaces, _) = self.network_info(network)?;
        let ns = namespaces
            .get(host)
            .ok_or_else(|| SubstrateError::Rejected(format!("host h{} is not part of {}", host, network)))?;

        let mut process = self.command("ip");
        process
            .args(["netns", "exec"])
            .arg(ns)
            .arg(&command.program)
            .args(&command.args)
            .envs(&command.env)
            .stdin(Stdio::null());
        match &command.log_path {
            Some(path) => {
                let log = File::create(path)?;
                process.stdout(log.try_clone()?).stderr(log);
            }
            None => {
                process.stdout(Stdio::null()).stderr(Stdio::null());
            }
        }

        let child = process.spawn().map_err(|e| SubstrateError::Command {
            command: command.command_line(),
            reason: e.to_string(),
        })?;
        let pid = child.id();
        debug!("netns: pid {} in {}: {}", pid, ns, command.command_line());
        self.lock().children.insert(
            pid,
            RunningChild {
                network,
                child,
                exit: None,
            },
        );
        Ok(pid)
    }

    fn poll_process(&self, pid: Pid) -> Result<Option<ProcessExit>, SubstrateError> {
        let mut state = self.lock();
        let entry = state
            .children
            .get_mut(&pid)
            .ok_or(SubstrateError::UnknownProcess(pid))?;
        if entry.exit.is_none() {
            if let Some(status) = entry.child.try_wait()? {
                entry.exit = Some(ProcessExit { code: status.code() });
            }
        }
        Ok(entry.exit)
    }

    fn stop_process(&self, pid: Pid) -> Result<(), SubstrateError> {
        let mut state = self.lock();
        let entry = state
            .children
            .get_mut(&pid)
            .ok_or(SubstrateError::UnknownProcess(pid))?;
        if entry.exit.is_none() {
            // kill fails only when the child already exited
            let _ = entry.child.kill();
            let status = entry.child.wait()?;
            entry.exit = Some(ProcessExit { code: status.code() });
        }
        Ok(())
    }

    fn teardown(&self, network: NetworkHandle) -> Result<(), SubstrateError> {
        let namespaces = {
            let mut state = self.lock();
            let net = state
                .networks
                .remove(&network)
                .ok_or(SubstrateError::UnknownNetwork(network.0))?;
            for entry in state.children.values_mut().filter(|c| c.network == network) {
                if entry.exit.is_none() {
                    let _ = entry.child.kill();
                    if let Ok(status) = entry.child.wait() {
                        entry.exit = Some(ProcessExit { code: status.code() });
                    }
                }
            }
            net.namespaces
        };

        self.delete_namespaces(&namespaces);
        info!("netns: tore down {}", network);
        Ok(())
    }
}
