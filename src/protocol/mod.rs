//! Protocol suites under test.

pub mod suite;
pub mod types;

pub use suite::{placeholder_vars, BoundProcess, Endpoints, ProtocolSuiteManager};
pub use types::{ExecutionType, HostRole, ProcessSpec, ProtocolDefinition, ProtocolIteration};
