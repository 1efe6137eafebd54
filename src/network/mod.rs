//! Emulated networks.
//!
//! The [`Substrate`] trait is the boundary to whatever actually emulates
//! hosts and links; [`NetworkBuilder`] turns topology variants into
//! [`BuiltNetwork`]s on top of it.

pub mod builder;
pub mod netns;
pub mod sim;
pub mod substrate;

pub use builder::{BuiltNetwork, NetworkBuilder};
pub use netns::NetnsSubstrate;
pub use sim::{ProcessBehavior, SimEvent, SimSubstrate};
pub use substrate::{HostSpec, LinkSpec, NetworkHandle, NetworkSpec, Pid, ProcessCommand, ProcessExit, Substrate};
