//! Routing strategies and forwarding computation.

use std::collections::VecDeque;
use std::fmt;
use std::net::Ipv4Addr;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::types::{TopologyKind, TopologyVariant};
use crate::error::UnsupportedStrategy;
use crate::ip::AddressPlan;

/// How forwarding state gets into a built network
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingStrategy {
    /// Next hop along the host chain, linear topologies only
    StaticRoute,
    /// Shortest path by hop count over any shape
    #[default]
    StaticBfs,
    /// A routing daemon on every host; the builder waits for convergence
    DynamicConverging,
}

impl RoutingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingStrategy::StaticRoute => "static_route",
            RoutingStrategy::StaticBfs => "static_bfs",
            RoutingStrategy::DynamicConverging => "dynamic_converging",
        }
    }

    /// Whether the strategy can be used on a topology of `kind`
    pub fn supports(&self, kind: TopologyKind) -> bool {
        match self {
            RoutingStrategy::StaticRoute => kind == TopologyKind::Linear,
            RoutingStrategy::StaticBfs | RoutingStrategy::DynamicConverging => true,
        }
    }

    pub fn is_static(&self) -> bool {
        !matches!(self, RoutingStrategy::DynamicConverging)
    }
}

impl fmt::Display for RoutingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One forwarding entry installed on `host`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RouteEntry {
    pub host: usize,
    pub destination: usize,
    pub next_hop: usize,
    /// Address of `next_hop` on the link shared with `host`
    pub via: Ipv4Addr,
}

/// Compute the static forwarding entries of `variant`.
///
/// Entries are sorted by `(host, destination)`. The dynamic strategy has no
/// static entries.
pub fn compute_forwarding(
    variant: &TopologyVariant,
    strategy: RoutingStrategy,
    plan: &AddressPlan,
) -> Result<Vec<RouteEntry>, UnsupportedStrategy> {
    if !strategy.supports(variant.kind) {
        return Err(UnsupportedStrategy {
            strategy: strategy.to_string(),
            kind: variant.kind.to_string(),
        });
    }

    let n = variant.nodes;
    let mut hops: Vec<(usize, usize, usize)> = Vec::new();

    match strategy {
        RoutingStrategy::DynamicConverging => return Ok(Vec::new()),
        RoutingStrategy::StaticRoute => {
            for host in 0..n {
                for destination in (0..n).filter(|&d| d != host) {
                    let next_hop = if destination > host { host + 1 } else { host - 1 };
                    hops.push((host, destination, next_hop));
                }
            }
        }
        RoutingStrategy::StaticBfs => {
            let neighbors = adjacency_lists(variant);
            // A BFS tree rooted at the destination gives every host its next hop
            for destination in 0..n {
                let parents = bfs_parents(&neighbors, destination);
                for host in (0..n).filter(|&h| h != destination) {
                    match parents[host] {
                        Some(next_hop) => hops.push((host, destination, next_hop)),
                        None => warn!(
                            "topology-{}: h{} cannot reach h{}",
                            variant.ordinal, host, destination
                        ),
                    }
                }
            }
        }
    }

    let mut entries: Vec<RouteEntry> = hops
        .into_iter()
        .filter_map(|(host, destination, next_hop)| {
            let link = plan.link_between(host, next_hop)?;
            let via = plan.addr_on_link(link, next_hop)?;
            Some(RouteEntry {
                host,
                destination,
                next_hop,
                via,
            })
        })
        .collect();
    entries.sort_by_key(|e| (e.host, e.destination));

    debug!(
        "topology-{}: {} forwarding entries for {}",
        variant.ordinal,
        entries.len(),
        strategy
    );
    Ok(entries)
}

fn adjacency_lists(variant: &TopologyVariant) -> Vec<Vec<usize>> {
    let mut neighbors = vec![Vec::new(); variant.nodes];
    for link in &variant.links {
        neighbors[link.a].push(link.b);
        neighbors[link.b].push(link.a);
    }
    for list in &mut neighbors {
        list.sort_unstable();
        list.dedup();
    }
    neighbors
}

fn bfs_parents(neighbors: &[Vec<usize>], root: usize) -> Vec<Option<usize>> {
    let mut parents = vec![None; neighbors.len()];
    let mut visited = vec![false; neighbors.len()];
    let mut queue = VecDeque::from([root]);
    visited[root] = true;

    while let Some(node) = queue.pop_front() {
        for &next in &neighbors[node] {
            if !visited[next] {
                visited[next] = true;
                parents[next] = Some(node);
                queue.push_back(next);
            }
        }
    }
    parents
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::types::{Link, LinkParams};

    fn variant(kind: TopologyKind, nodes: usize, pairs: &[(usize, usize)]) -> TopologyVariant {
        TopologyVariant {
            ordinal: 0,
            template: "t".to_string(),
            kind,
            nodes,
            links: pairs
                .iter()
                .map(|&(a, b)| Link {
                    a,
                    b,
                    params: LinkParams::default(),
                })
                .collect(),
            swept: Vec::new(),
        }
    }

    fn next_hop(entries: &[RouteEntry], host: usize, destination: usize) -> Option<usize> {
        entries
            .iter()
            .find(|e| e.host == host && e.destination == destination)
            .map(|e| e.next_hop)
    }

    #[test]
    fn test_static_route_walks_chain() {
        let v = variant(TopologyKind::Linear, 4, &[(0, 1), (1, 2), (2, 3)]);
        let plan = AddressPlan::for_variant(&v);
        let entries = compute_forwarding(&v, RoutingStrategy::StaticRoute, &plan).unwrap();
        assert_eq!(entries.len(), 12);
        assert_eq!(next_hop(&entries, 0, 3), Some(1));
        assert_eq!(next_hop(&entries, 3, 0), Some(2));
        assert_eq!(next_hop(&entries, 2, 3), Some(3));

        let via = entries.iter().find(|e| e.host == 0 && e.destination == 3).unwrap().via;
        assert_eq!(Some(via), plan.addr_on_link(0, 1));
    }

    #[test]
    fn test_static_route_rejected_for_mesh() {
        let v = variant(TopologyKind::Mesh, 3, &[(0, 1), (0, 2), (1, 2)]);
        let plan = AddressPlan::for_variant(&v);
        let err = compute_forwarding(&v, RoutingStrategy::StaticRoute, &plan).unwrap_err();
        assert_eq!(err.kind, "mesh");
    }

    #[test]
    fn test_bfs_prefers_fewest_hops() {
        // 0 - 1 - 2 - 3 with a shortcut 0 - 3
        let v = variant(TopologyKind::Custom, 4, &[(0, 1), (1, 2), (2, 3), (0, 3)]);
        let plan = AddressPlan::for_variant(&v);
        let entries = compute_forwarding(&v, RoutingStrategy::StaticBfs, &plan).unwrap();
        assert_eq!(next_hop(&entries, 0, 3), Some(3));
        // ties go to the lower-numbered neighbour
        assert_eq!(next_hop(&entries, 1, 3), Some(0));
        assert_eq!(next_hop(&entries, 0, 2), Some(1));
    }

    #[test]
    fn test_bfs_skips_unreachable() {
        let v = variant(TopologyKind::Custom, 4, &[(0, 1), (2, 3)]);
        let plan = AddressPlan::for_variant(&v);
        let entries = compute_forwarding(&v, RoutingStrategy::StaticBfs, &plan).unwrap();
        assert_eq!(next_hop(&entries, 0, 1), Some(1));
        assert_eq!(next_hop(&entries, 0, 2), None);
    }

    #[test]
    fn test_dynamic_has_no_static_entries() {
        let v = variant(TopologyKind::Linear, 2, &[(0, 1)]);
        let plan = AddressPlan::for_variant(&v);
        assert!(compute_forwarding(&v, RoutingStrategy::DynamicConverging, &plan)
            .unwrap()
            .is_empty());
    }
}
