//! Topology type definitions.
//!
//! Templates describe a parameterized network shape; variants are the
//! concrete, ordinal-numbered instances the expander derives from them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Shape of a topology template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopologyKind {
    /// Hosts chained h0 - h1 - ... - h(n-1)
    Linear,
    /// Every pair of hosts directly linked
    Mesh,
    /// Links taken from an adjacency matrix
    #[serde(alias = "custom_graph", alias = "custom-graph")]
    Custom,
}

impl fmt::Display for TopologyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TopologyKind::Linear => "linear",
            TopologyKind::Mesh => "mesh",
            TopologyKind::Custom => "custom",
        };
        f.write_str(name)
    }
}

/// Link attribute that can be swept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkAttribute {
    Loss,
    Latency,
    Jitter,
    #[serde(alias = "bw_fwd")]
    BandwidthForward,
    #[serde(alias = "bw_bwd")]
    BandwidthBackward,
}

impl LinkAttribute {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkAttribute::Loss => "loss",
            LinkAttribute::Latency => "latency",
            LinkAttribute::Jitter => "jitter",
            LinkAttribute::BandwidthForward => "bandwidth_forward",
            LinkAttribute::BandwidthBackward => "bandwidth_backward",
        }
    }
}

impl fmt::Display for LinkAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Traffic-shaping parameters of one link
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkParams {
    /// Packet loss in percent
    pub loss: f64,
    /// One-way delay in milliseconds
    pub latency_ms: f64,
    /// Delay variation in milliseconds
    pub jitter_ms: f64,
    /// Rate limit in Mbit/s from `a` to `b`, unshaped when `None`
    pub bw_fwd: Option<f64>,
    /// Rate limit in Mbit/s from `b` to `a`
    pub bw_bwd: Option<f64>,
}

impl LinkParams {
    pub fn set(&mut self, attribute: LinkAttribute, value: f64) {
        match attribute {
            LinkAttribute::Loss => self.loss = value,
            LinkAttribute::Latency => self.latency_ms = value,
            LinkAttribute::Jitter => self.jitter_ms = value,
            LinkAttribute::BandwidthForward => self.bw_fwd = Some(value),
            LinkAttribute::BandwidthBackward => self.bw_bwd = Some(value),
        }
    }

    pub fn get(&self, attribute: LinkAttribute) -> Option<f64> {
        match attribute {
            LinkAttribute::Loss => Some(self.loss),
            LinkAttribute::Latency => Some(self.latency_ms),
            LinkAttribute::Jitter => Some(self.jitter_ms),
            LinkAttribute::BandwidthForward => self.bw_fwd,
            LinkAttribute::BandwidthBackward => self.bw_bwd,
        }
    }
}

impl fmt::Display for LinkParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "loss {}% latency {} ms jitter {} ms",
            self.loss, self.latency_ms, self.jitter_ms
        )?;
        match self.bw_fwd {
            Some(rate) => write!(f, " bw_fwd {} Mbit/s", rate)?,
            None => f.write_str(" bw_fwd unlimited")?,
        }
        match self.bw_bwd {
            Some(rate) => write!(f, " bw_bwd {} Mbit/s", rate),
            None => f.write_str(" bw_bwd unlimited"),
        }
    }
}

/// A swept link attribute.
///
/// `baseline` holds one starting value per link (or a single value shared by
/// all links of a mesh). With a step, link `i` takes the values
/// `baseline[i] + step * k` for `k` in `0..=steps`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSweep {
    pub attribute: LinkAttribute,
    pub baseline: Vec<f64>,
    pub step: Option<f64>,
    pub steps: u32,
}

impl ParameterSweep {
    /// A fixed attribute that contributes a single value
    pub fn fixed(attribute: LinkAttribute, baseline: Vec<f64>) -> Self {
        Self {
            attribute,
            baseline,
            step: None,
            steps: 0,
        }
    }

    /// Number of values the attribute takes across the sweep
    pub fn cardinality(&self) -> usize {
        match self.step {
            Some(_) => self.steps as usize + 1,
            None => 1,
        }
    }

    pub fn is_swept(&self) -> bool {
        self.cardinality() > 1
    }

    /// Value of the attribute on `link` at progression index `index`
    pub fn value(&self, link: usize, index: usize) -> f64 {
        let base = if self.baseline.len() == 1 {
            self.baseline[0]
        } else {
            self.baseline[link]
        };
        match self.step {
            Some(step) => base + step * index as f64,
            None => base,
        }
    }

    /// Full progression of values for `link`
    pub fn progression(&self, link: usize) -> Vec<f64> {
        (0..self.cardinality()).map(|k| self.value(link, k)).collect()
    }
}

/// Normalized, immutable topology description
#[derive(Debug, Clone, PartialEq)]
pub struct TopologyTemplate {
    pub name: String,
    pub kind: TopologyKind,
    pub nodes: usize,
    /// Declared sweeps in declaration order (empty for custom templates)
    pub sweeps: Vec<ParameterSweep>,
    /// Parameters of attributes that are not swept
    pub base_link: LinkParams,
    /// Square matrix, only for custom templates
    pub adjacency: Option<Vec<Vec<u8>>>,
}

impl TopologyTemplate {
    /// Host pairs joined by a link, in link-index order
    pub fn link_pairs(&self) -> Vec<(usize, usize)> {
        match self.kind {
            TopologyKind::Linear => (1..self.nodes).map(|b| (b - 1, b)).collect(),
            TopologyKind::Mesh => {
                let mut pairs = Vec::new();
                for a in 0..self.nodes {
                    for b in (a + 1)..self.nodes {
                        pairs.push((a, b));
                    }
                }
                pairs
            }
            TopologyKind::Custom => {
                let mut pairs = Vec::new();
                if let Some(matrix) = &self.adjacency {
                    for (a, row) in matrix.iter().enumerate() {
                        for (b, &cell) in row.iter().enumerate().skip(a + 1) {
                            if cell != 0 {
                                pairs.push((a, b));
                            }
                        }
                    }
                }
                pairs
            }
        }
    }

    pub fn link_count(&self) -> usize {
        self.link_pairs().len()
    }
}

/// One concrete link of a variant
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Link {
    pub a: usize,
    pub b: usize,
    pub params: LinkParams,
}

/// A concrete instantiation of a template
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopologyVariant {
    pub ordinal: usize,
    pub template: String,
    pub kind: TopologyKind,
    pub nodes: usize,
    pub links: Vec<Link>,
    /// Values chosen for each swept attribute on link 0, in declaration order
    pub swept: Vec<(LinkAttribute, f64)>,
}

impl TopologyVariant {
    /// Directory name used for the variant's results
    pub fn dir_name(&self) -> String {
        format!("topology-{}", self.ordinal)
    }

    /// Human-readable description; the first line carries the parameters of
    /// link 0 in the `loss N% latency N ms` form the report tooling parses.
    pub fn describe(&self) -> String {
        let mut lines = Vec::new();
        match self.links.first() {
            Some(first) => lines.push(first.params.to_string()),
            None => lines.push("no links".to_string()),
        }
        lines.push(String::new());
        lines.push(format!("template: {}", self.template));
        lines.push(format!("type: {}", self.kind));
        lines.push(format!("nodes: {}", self.nodes));
        lines.push(format!("ordinal: {}", self.ordinal));
        if !self.swept.is_empty() {
            let swept: Vec<String> = self
                .swept
                .iter()
                .map(|(attribute, value)| format!("{}={}", attribute, value))
                .collect();
            lines.push(format!("swept: {}", swept.join(", ")));
        }
        lines.push("links:".to_string());
        for link in &self.links {
            lines.push(format!("  h{} <-> h{}: {}", link.a, link.b, link.params));
        }
        lines.join("\n") + "\n"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progression() {
        let sweep = ParameterSweep {
            attribute: LinkAttribute::Loss,
            baseline: vec![2.0],
            step: Some(2.0),
            steps: 3,
        };
        assert_eq!(sweep.cardinality(), 4);
        assert_eq!(sweep.progression(0), vec![2.0, 4.0, 6.0, 8.0]);

        let fixed = ParameterSweep::fixed(LinkAttribute::Latency, vec![10.0, 30.0]);
        assert_eq!(fixed.cardinality(), 1);
        assert!(!fixed.is_swept());
        assert_eq!(fixed.progression(1), vec![30.0]);
    }

    #[test]
    fn test_zero_steps_is_single_value() {
        let sweep = ParameterSweep {
            attribute: LinkAttribute::Jitter,
            baseline: vec![1.0],
            step: Some(5.0),
            steps: 0,
        };
        assert_eq!(sweep.progression(0), vec![1.0]);
    }

    #[test]
    fn test_link_pairs() {
        let mut template = TopologyTemplate {
            name: "t".to_string(),
            kind: TopologyKind::Linear,
            nodes: 4,
            sweeps: Vec::new(),
            base_link: LinkParams::default(),
            adjacency: None,
        };
        assert_eq!(template.link_pairs(), vec![(0, 1), (1, 2), (2, 3)]);

        template.kind = TopologyKind::Mesh;
        assert_eq!(template.link_count(), 6);

        template.kind = TopologyKind::Custom;
        template.nodes = 3;
        template.adjacency = Some(vec![vec![0, 1, 1], vec![1, 0, 0], vec![1, 0, 0]]);
        assert_eq!(template.link_pairs(), vec![(0, 1), (0, 2)]);
    }

    #[test]
    fn test_description_first_line() {
        let params = LinkParams {
            loss: 2.0,
            latency_ms: 10.0,
            ..LinkParams::default()
        };
        let variant = TopologyVariant {
            ordinal: 0,
            template: "chain".to_string(),
            kind: TopologyKind::Linear,
            nodes: 2,
            links: vec![Link { a: 0, b: 1, params }],
            swept: vec![(LinkAttribute::Loss, 2.0)],
        };
        let text = variant.describe();
        assert!(text.starts_with("loss 2% latency 10 ms"));
        assert!(text.contains("h0 <-> h1"));
        assert_eq!(variant.dir_name(), "topology-0");
    }
}
