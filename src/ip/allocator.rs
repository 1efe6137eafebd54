//! Address plan for emulated hosts and links.
//!
//! Host `i` owns `10.255.0.{i+1}/32` as its primary address. Link `l` gets
//! the subnet `10.{l >> 8}.{l & 0xff}.0/24`; its lower-numbered end is `.1`
//! and the other end `.2`.

use std::net::Ipv4Addr;

use crate::topology::TopologyVariant;

/// Largest host count the plan can address
pub const MAX_HOSTS: usize = 250;

/// Largest link index that stays clear of the host range
const MAX_LINKS: usize = 255 * 256;

/// Addresses of one topology variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressPlan {
    hosts: usize,
    links: Vec<(usize, usize)>,
}

impl AddressPlan {
    /// Plan for `hosts` hosts joined by `links`, in link-index order
    pub fn new(hosts: usize, links: Vec<(usize, usize)>) -> Self {
        debug_assert!(hosts <= MAX_HOSTS);
        debug_assert!(links.len() <= MAX_LINKS);
        let links = links
            .into_iter()
            .map(|(a, b)| if a <= b { (a, b) } else { (b, a) })
            .collect();
        Self { hosts, links }
    }

    pub fn for_variant(variant: &TopologyVariant) -> Self {
        Self::new(
            variant.nodes,
            variant.links.iter().map(|link| (link.a, link.b)).collect(),
        )
    }

    pub fn host_count(&self) -> usize {
        self.hosts
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Primary address of `host`
    pub fn host_addr(&self, host: usize) -> Ipv4Addr {
        Ipv4Addr::new(10, 255, (host / 256) as u8, (host % 256 + 1) as u8)
    }

    /// Network address and prefix length of link `index`
    pub fn link_subnet(&self, index: usize) -> (Ipv4Addr, u8) {
        (Ipv4Addr::new(10, (index >> 8) as u8, (index & 0xff) as u8, 0), 24)
    }

    /// Addresses of both ends of link `index`, lower-numbered host first
    pub fn link_addrs(&self, index: usize) -> (Ipv4Addr, Ipv4Addr) {
        let (network, _) = self.link_subnet(index);
        let [a, b, c, _] = network.octets();
        (Ipv4Addr::new(a, b, c, 1), Ipv4Addr::new(a, b, c, 2))
    }

    /// Index of the link joining `a` and `b`
    pub fn link_between(&self, a: usize, b: usize) -> Option<usize> {
        let key = if a <= b { (a, b) } else { (b, a) };
        self.links.iter().position(|&pair| pair == key)
    }

    /// Address `host` uses on link `index`
    pub fn addr_on_link(&self, index: usize, host: usize) -> Option<Ipv4Addr> {
        let &(low, high) = self.links.get(index)?;
        let (low_addr, high_addr) = self.link_addrs(index);
        if host == low {
            Some(low_addr)
        } else if host == high {
            Some(high_addr)
        } else {
            None
        }
    }
}
