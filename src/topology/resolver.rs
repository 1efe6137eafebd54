//! Topology descriptor resolution.
//!
//! Turns a topology reference into a validated [`TopologyTemplate`]. All
//! shape problems are reported here, before anything touches the substrate.

use std::collections::HashSet;

use log::{debug, warn};

use super::types::{LinkAttribute, LinkParams, ParameterSweep, TopologyKind, TopologyTemplate};
use crate::config::{LinkDescriptor, TopologyDescriptor};
use crate::config_loader::{self, DocumentSource, Section};
use crate::error::ConfigError;
use crate::ip::MAX_HOSTS;

/// Resolves topology references against a document source
pub struct TopologyResolver<'a> {
    source: &'a dyn DocumentSource,
}

impl<'a> TopologyResolver<'a> {
    pub fn new(source: &'a dyn DocumentSource) -> Self {
        Self { source }
    }

    /// Look up `reference` and normalize it into a template
    pub fn resolve(&self, reference: &str) -> Result<TopologyTemplate, ConfigError> {
        let descriptor: TopologyDescriptor =
            config_loader::load(self.source, reference, Section::Topology)?;
        normalize(reference, descriptor)
    }
}

/// Validate a descriptor and turn it into a template
pub fn normalize(name: &str, descriptor: TopologyDescriptor) -> Result<TopologyTemplate, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidTopology {
        name: name.to_string(),
        reason,
    };

    if descriptor.nodes < 2 {
        return Err(invalid(format!(
            "at least 2 nodes are required, got {}",
            descriptor.nodes
        )));
    }
    if descriptor.nodes > MAX_HOSTS {
        return Err(invalid(format!(
            "{} nodes exceed the supported maximum of {}",
            descriptor.nodes, MAX_HOSTS
        )));
    }

    let base_link = base_link(&descriptor.link).map_err(invalid)?;

    let template = match descriptor.kind {
        TopologyKind::Custom => {
            let matrix = descriptor
                .adjacency
                .ok_or_else(|| invalid("custom topologies need an adjacency matrix".to_string()))?;
            validate_adjacency(&matrix, descriptor.nodes).map_err(invalid)?;
            if !descriptor.sweep.is_empty() {
                warn!(
                    "Topology '{}': sweeps are ignored for custom topologies ({} declared)",
                    name,
                    descriptor.sweep.len()
                );
            }
            TopologyTemplate {
                name: name.to_string(),
                kind: TopologyKind::Custom,
                nodes: descriptor.nodes,
                sweeps: Vec::new(),
                base_link,
                adjacency: Some(matrix),
            }
        }
        kind => {
            if descriptor.adjacency.is_some() {
                warn!("Topology '{}': adjacency matrix ignored for a {} topology", name, kind);
            }
            let mut template = TopologyTemplate {
                name: name.to_string(),
                kind,
                nodes: descriptor.nodes,
                sweeps: Vec::new(),
                base_link,
                adjacency: None,
            };
            let link_count = template.link_count();

            let mut seen = HashSet::new();
            for entry in descriptor.sweep {
                if !seen.insert(entry.attribute) {
                    return Err(invalid(format!("attribute '{}' is declared twice", entry.attribute)));
                }

                let baseline = entry.init.into_values();
                let accepted = match kind {
                    TopologyKind::Linear => baseline.len() == descriptor.nodes - 1,
                    _ => baseline.len() == 1 || baseline.len() == link_count,
                };
                if !accepted {
                    return Err(invalid(match kind {
                        TopologyKind::Linear => format!(
                            "'{}' has {} baseline value(s) but a linear topology of {} nodes has {} links",
                            entry.attribute,
                            baseline.len(),
                            descriptor.nodes,
                            descriptor.nodes - 1
                        ),
                        _ => format!(
                            "'{}' needs 1 or {} baseline values, got {}",
                            entry.attribute,
                            link_count,
                            baseline.len()
                        ),
                    }));
                }

                let (step, steps) = match (entry.step, entry.steps) {
                    (None, None) => (None, 0),
                    (Some(step), Some(steps)) => {
                        if !step.is_finite() || step <= 0.0 {
                            return Err(invalid(format!(
                                "'{}' step must be a positive number, got {}",
                                entry.attribute, step
                            )));
                        }
                        (Some(step), steps)
                    }
                    _ => {
                        return Err(invalid(format!(
                            "'{}' needs both step and steps, or neither",
                            entry.attribute
                        )))
                    }
                };

                let sweep = ParameterSweep {
                    attribute: entry.attribute,
                    baseline,
                    step,
                    steps,
                };
                validate_range(&sweep).map_err(invalid)?;
                debug!(
                    "Topology '{}': {} takes {} value(s)",
                    name,
                    sweep.attribute,
                    sweep.cardinality()
                );
                template.sweeps.push(sweep);
            }
            let variants = template
                .sweeps
                .iter()
                .try_fold(1usize, |acc, s| acc.checked_mul(s.cardinality()));
            if variants.is_none() {
                return Err(invalid("sweep product is too large to enumerate".to_string()));
            }
            template
        }
    };

    Ok(template)
}

fn base_link(link: &LinkDescriptor) -> Result<LinkParams, String> {
    let params = LinkParams {
        loss: link.loss,
        latency_ms: link.latency,
        jitter_ms: link.jitter,
        bw_fwd: link.bandwidth_forward,
        bw_bwd: link.bandwidth_backward,
    };
    for attribute in [
        LinkAttribute::Loss,
        LinkAttribute::Latency,
        LinkAttribute::Jitter,
        LinkAttribute::BandwidthForward,
        LinkAttribute::BandwidthBackward,
    ] {
        if let Some(value) = params.get(attribute) {
            check_value(attribute, value)?;
        }
    }
    Ok(params)
}

fn check_value(attribute: LinkAttribute, value: f64) -> Result<(), String> {
    if !value.is_finite() || value < 0.0 {
        return Err(format!("{} value {} must be a non-negative number", attribute, value));
    }
    match attribute {
        LinkAttribute::Loss if value > 100.0 => {
            Err(format!("loss reaches {}%, above 100%", value))
        }
        LinkAttribute::BandwidthForward | LinkAttribute::BandwidthBackward if value == 0.0 => {
            Err(format!("{} must be greater than zero", attribute))
        }
        _ => Ok(()),
    }
}

/// Both ends of every link's progression must be in range
fn validate_range(sweep: &ParameterSweep) -> Result<(), String> {
    let last = sweep.cardinality() - 1;
    for link in 0..sweep.baseline.len() {
        check_value(sweep.attribute, sweep.value(link, 0))?;
        check_value(sweep.attribute, sweep.value(link, last))?;
    }
    Ok(())
}

fn validate_adjacency(matrix: &[Vec<u8>], nodes: usize) -> Result<(), String> {
    if matrix.len() != nodes {
        return Err(format!(
            "adjacency matrix has {} rows but the topology has {} nodes",
            matrix.len(),
            nodes
        ));
    }
    for (i, row) in matrix.iter().enumerate() {
        if row.len() != nodes {
            return Err(format!(
                "adjacency row {} has {} columns, expected {}",
                i,
                row.len(),
                nodes
            ));
        }
        if row[i] != 0 {
            return Err(format!("host h{} is linked to itself", i));
        }
        for (j, &cell) in row.iter().enumerate() {
            if cell > 1 {
                return Err(format!("adjacency entry ({}, {}) must be 0 or 1, got {}", i, j, cell));
            }
            if cell != matrix[j][i] {
                return Err(format!("adjacency matrix is not symmetric at ({}, {})", i, j));
            }
        }
    }
    if matrix.iter().all(|row| row.iter().all(|&cell| cell == 0)) {
        return Err("adjacency matrix has no links".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_loader::YamlSource;

    const SUITE: &str = r#"
topologies:
  pair:
    type: linear
    nodes: 2
    sweep:
      - attribute: loss
        init: [2]
        step: 2
        steps: 3
      - attribute: latency
        init: [10]
        step: 20
        steps: 3
    link:
      bandwidth_forward: 100
  short-baseline:
    type: linear
    nodes: 4
    sweep:
      - attribute: loss
        init: [1, 1]
  square:
    type: mesh
    nodes: 4
    sweep:
      - attribute: latency
        init: 5
  bad-matrix:
    type: custom
    nodes: 3
    adjacency:
      - [0, 1]
      - [1, 0]
  triangle:
    type: custom-graph
    nodes: 3
    adjacency:
      - [0, 1, 1]
      - [1, 0, 1]
      - [1, 1, 0]
    link:
      latency: 15
"#;

    fn source() -> YamlSource {
        YamlSource::from_yaml(SUITE, ".").unwrap()
    }

    #[test]
    fn test_resolve_linear() {
        let source = source();
        let template = TopologyResolver::new(&source).resolve("pair").unwrap();
        assert_eq!(template.kind, TopologyKind::Linear);
        assert_eq!(template.sweeps.len(), 2);
        assert_eq!(template.sweeps[0].attribute, LinkAttribute::Loss);
        assert_eq!(template.base_link.bw_fwd, Some(100.0));
    }

    #[test]
    fn test_missing_topology() {
        let source = source();
        let err = TopologyResolver::new(&source).resolve("nowhere").unwrap_err();
        assert!(matches!(err, ConfigError::Missing { .. }));
    }

    #[test]
    fn test_linear_baseline_must_match_link_count() {
        let source = source();
        let err = TopologyResolver::new(&source).resolve("short-baseline").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTopology { .. }));
        assert!(err.to_string().contains("3 links"));
    }

    #[test]
    fn test_mesh_accepts_shared_baseline() {
        let source = source();
        let template = TopologyResolver::new(&source).resolve("square").unwrap();
        assert_eq!(template.link_count(), 6);
        assert_eq!(template.sweeps[0].baseline, vec![5.0]);
    }

    #[test]
    fn test_custom_dimensions_must_match_nodes() {
        let source = source();
        let err = TopologyResolver::new(&source).resolve("bad-matrix").unwrap_err();
        assert!(err.to_string().contains("2 rows"));

        let template = TopologyResolver::new(&source).resolve("triangle").unwrap();
        assert_eq!(template.kind, TopologyKind::Custom);
        assert_eq!(template.link_count(), 3);
        assert_eq!(template.base_link.latency_ms, 15.0);
    }

    #[test]
    fn test_asymmetric_matrix_rejected() {
        let descriptor: TopologyDescriptor = serde_yaml::from_str(
            "type: custom\nnodes: 2\nadjacency: [[0, 1], [0, 0]]",
        )
        .unwrap();
        let err = normalize("lopsided", descriptor).unwrap_err();
        assert!(err.to_string().contains("not symmetric"));
    }

    #[test]
    fn test_sweep_validation() {
        let cases = [
            // step without steps
            "type: linear\nnodes: 2\nsweep: [{attribute: loss, init: 1, step: 1}]",
            // loss beyond 100%
            "type: linear\nnodes: 2\nsweep: [{attribute: loss, init: 90, step: 5, steps: 3}]",
            // negative step
            "type: linear\nnodes: 2\nsweep: [{attribute: latency, init: 10, step: -5, steps: 1}]",
            // duplicated attribute
            "type: linear\nnodes: 2\nsweep: [{attribute: loss, init: 1}, {attribute: loss, init: 2}]",
            // zero bandwidth
            "type: linear\nnodes: 2\nsweep: [{attribute: bw_fwd, init: 0}]",
            // single node
            "type: linear\nnodes: 1",
        ];
        for yaml in cases {
            let descriptor: TopologyDescriptor = serde_yaml::from_str(yaml).unwrap();
            assert!(normalize("t", descriptor).is_err(), "accepted: {}", yaml);
        }
    }
}
