//! Realises topology variants on a substrate.

use std::fmt;
use std::net::Ipv4Addr;
use std::thread;
use std::time::Instant;

use log::{debug, info, warn};

use super::substrate::{HostSpec, LinkSpec, NetworkHandle, NetworkSpec, Pid, ProcessCommand, Substrate};
use crate::config::RoutingConfig;
use crate::error::{BuildError, RoutingConvergenceError, SubstrateError, UnsupportedStrategy};
use crate::ip::AddressPlan;
use crate::topology::{compute_forwarding, RoutingStrategy, TopologyVariant};
use crate::utils::template::{self, Vars};

/// Builds variants on one substrate
pub struct NetworkBuilder<'s> {
    substrate: &'s dyn Substrate,
    routing: &'s RoutingConfig,
}

impl<'s> NetworkBuilder<'s> {
    pub fn new(substrate: &'s dyn Substrate, routing: &'s RoutingConfig) -> Self {
        Self { substrate, routing }
    }

    /// Create hosts and links for `variant` and install `strategy`.
    ///
    /// On error everything created so far is torn down before returning.
    pub fn build(
        &self,
        label: &str,
        variant: &TopologyVariant,
        strategy: RoutingStrategy,
    ) -> Result<BuiltNetwork<'s>, BuildError> {
        if !strategy.supports(variant.kind) {
            return Err(UnsupportedStrategy {
                strategy: strategy.to_string(),
                kind: variant.kind.to_string(),
            }
            .into());
        }

        let ordinal = variant.ordinal;
        let substrate_err = |source: SubstrateError| BuildError::Substrate { ordinal, source };
        let plan = AddressPlan::for_variant(variant);

        info!(
            "Building {} ({} hosts, {} links, {})",
            label,
            variant.nodes,
            variant.links.len(),
            strategy
        );

        let spec = NetworkSpec {
            label: label.to_string(),
            hosts: (0..variant.nodes)
                .map(|i| HostSpec {
                    name: format!("h{}", i),
                    addr: plan.host_addr(i),
                })
                .collect(),
        };
        let handle = self.substrate.create_network(&spec).map_err(substrate_err)?;

        // From here on a failure drops `network`, which tears it down
        let mut network = BuiltNetwork {
            substrate: self.substrate,
            handle,
            ordinal,
            label: label.to_string(),
            hosts: spec.hosts,
            daemons: Vec::new(),
            torn_down: false,
        };

        for (index, link) in variant.links.iter().enumerate() {
            let (a_addr, b_addr) = plan.link_addrs(index);
            let (_, prefix) = plan.link_subnet(index);
            let link_spec = LinkSpec {
                index,
                a: link.a,
                b: link.b,
                a_addr,
                b_addr,
                prefix,
                params: link.params,
            };
            self.substrate.add_link(handle, &link_spec).map_err(substrate_err)?;
            debug!("{}: h{} <-> h{} {}", label, link.a, link.b, link.params);
        }

        if strategy.is_static() {
            let routes = compute_forwarding(variant, strategy, &plan)?;
            self.substrate.apply_routes(handle, &routes).map_err(substrate_err)?;
        } else {
            self.start_daemons(&mut network).map_err(substrate_err)?;
            self.await_convergence(&network)?;
        }

        Ok(network)
    }

    fn start_daemons(&self, network: &mut BuiltNetwork<'s>) -> Result<(), SubstrateError> {
        let Some(daemon) = &self.routing.daemon else {
            return Err(SubstrateError::Rejected(
                "dynamic routing requested but no routing daemon is configured".to_string(),
            ));
        };

        for host in 0..network.hosts.len() {
            let mut vars = Vars::new();
            vars.insert("host", network.hosts[host].name.clone());
            vars.insert("host_ip", network.hosts[host].addr.to_string());
            vars.insert("network", network.label.clone());
            let command = ProcessCommand::new(template::expand(&daemon.program, &vars))
                .args(template::expand_all(&daemon.args, &vars));
            let pid = self.substrate.start_process(network.handle, host, &command)?;
            network.daemons.push(pid);
        }
        debug!("{}: started {} routing daemons", network.label, network.daemons.len());
        Ok(())
    }

    /// Poll the substrate until routing converges or the window closes
    fn await_convergence(&self, network: &BuiltNetwork<'s>) -> Result<(), BuildError> {
        let timeout = self.routing.convergence_timeout;
        let started = Instant::now();
        let deadline = started + timeout;
        loop {
            let converged = self
                .substrate
                .routes_converged(network.handle)
                .map_err(|source| BuildError::Substrate {
                    ordinal: network.ordinal,
                    source,
                })?;
            if converged {
                info!("{}: routing converged after {:?}", network.label, started.elapsed());
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                warn!("{}: routing did not converge within {:?}", network.label, timeout);
                return Err(RoutingConvergenceError { timeout }.into());
            }
            thread::sleep(self.routing.poll_interval.min(deadline - now));
        }
    }
}

/// A variant realised on a substrate, exclusively owned by the case running it
pub struct BuiltNetwork<'s> {
    substrate: &'s dyn Substrate,
    handle: NetworkHandle,
    ordinal: usize,
    label: String,
    hosts: Vec<HostSpec>,
    daemons: Vec<Pid>,
    torn_down: bool,
}

impl<'s> BuiltNetwork<'s> {
    pub fn handle(&self) -> NetworkHandle {
        self.handle
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    /// Primary address of host `index`
    pub fn host_addr(&self, index: usize) -> Option<Ipv4Addr> {
        self.hosts.get(index).map(|h| h.addr)
    }

    pub fn host_name(&self, index: usize) -> Option<&str> {
        self.hosts.get(index).map(|h| h.name.as_str())
    }

    pub fn substrate(&self) -> &'s dyn Substrate {
        self.substrate
    }

    /// Stop the routing daemons and remove the network
    pub fn teardown(mut self) -> Result<(), SubstrateError> {
        self.release()
    }

    fn release(&mut self) -> Result<(), SubstrateError> {
        if self.torn_down {
            return Ok(());
        }
        self.torn_down = true;
        for pid in self.daemons.drain(..) {
            if let Err(e) = self.substrate.stop_process(pid) {
                debug!("{}: routing daemon {} already gone: {}", self.label, pid, e);
            }
        }
        self.substrate.teardown(self.handle)?;
        debug!("{}: torn down", self.label);
        Ok(())
    }
}

impl fmt::Debug for BuiltNetwork<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltNetwork")
            .field("handle", &self.handle)
            .field("label", &self.label)
            .field("hosts", &self.hosts.len())
            .field("torn_down", &self.torn_down)
            .finish()
    }
}

impl Drop for BuiltNetwork<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("Failed to tear down {}: {}", self.label, e);
        }
    }
}
