//! Network topology module.
//!
//! Topology templates are resolved from suite descriptors, expanded into
//! concrete variants and given forwarding tables for the static routing
//! strategies.

pub mod types;
pub mod resolver;
pub mod expander;
pub mod routing;

// Re-export key types and functions for easier access
pub use types::{Link, LinkAttribute, LinkParams, ParameterSweep, TopologyKind, TopologyTemplate, TopologyVariant};
pub use resolver::TopologyResolver;
pub use expander::{VariantExpander, Variants};
pub use routing::{compute_forwarding, RouteEntry, RoutingStrategy};
