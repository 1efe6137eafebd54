//! # netsweep - parameter-sweep test orchestration for emulated networks
//!
//! This library turns declarative, parameterized topology descriptions into
//! concrete emulated networks, drives transport-protocol suites and test
//! tools against every instance, and lays the results out for reporting.
//!
//! ## Overview
//!
//! A suite file declares topologies, protocols, test tools and test cases.
//! For one test case the engine:
//!
//! 1. resolves the referenced topology into a [`topology::TopologyTemplate`],
//! 2. expands its parameter sweeps into ordinal-numbered
//!    [`topology::TopologyVariant`]s,
//! 3. builds each variant in an emulation [`network::Substrate`] and installs
//!    the requested [`topology::RoutingStrategy`],
//! 4. resolves protocol definitions into process specs and runs every
//!    (protocol, tool) combination, sequentially or in isolated parallel lanes,
//! 5. persists per-run artifacts under `test_results/{test}/topology-{n}/`.
//!
//! ## Architecture
//!
//! - `config_loader`: structured-document source (YAML suite files)
//! - `config`: typed descriptors for every suite section
//! - `topology`: resolver, sweep expander and forwarding computation
//! - `ip`: address plan for hosts and links
//! - `network`: substrate interface, in-memory and netns substrates, builder
//! - `protocol`: protocol definitions and the suite manager
//! - `isolation`: execution contexts for concurrent lanes
//! - `orchestrator`: planning, the per-case state machine and run execution
//! - `results`: result layout, reports, analyzer hand-off and verdict markers
//! - `utils`: option rendering, placeholder expansion, path resolution
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use netsweep::config_loader::YamlSource;
//! use netsweep::network::SimSubstrate;
//! use netsweep::orchestrator::Runner;
//! use netsweep::results::NoopAnalyzer;
//!
//! let source = YamlSource::from_path("suite.yaml".as_ref())?;
//! let runner = Runner::new(
//!     Box::new(source),
//!     Box::new(SimSubstrate::new()),
//!     Box::new(NoopAnalyzer),
//!     "workspace".into(),
//! )?;
//! let report = runner.run("quic-vs-tcp", None)?;
//! println!("success: {} ({})", report.success, report.result_dir.display());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Error Handling
//!
//! Library errors are typed with `thiserror` (see [`error`]). Configuration
//! problems abort a test case before any network is built; everything that
//! goes wrong afterwards is captured per run and only the case-level
//! aggregation decides the verdict. The binary reports errors through
//! `color_eyre`.

pub mod config;
pub mod config_loader;
pub mod error;
pub mod ip;
pub mod isolation;
pub mod network;
pub mod orchestrator;
pub mod protocol;
pub mod results;
pub mod topology;
pub mod utils;
