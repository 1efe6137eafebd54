//! Sweep expansion tests against suites parsed from YAML.

use std::collections::HashSet;

use netsweep::config_loader::YamlSource;
use netsweep::topology::{LinkAttribute, TopologyResolver, TopologyTemplate, VariantExpander};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

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
      jitter: 1
  chain:
    type: linear
    nodes: 4
    sweep:
      - attribute: loss
        init: [0, 1, 2]
        step: 0.5
        steps: 2
      - attribute: bandwidth_forward
        init: [100, 50, 25]
  ring:
    type: mesh
    nodes: 4
    sweep:
      - attribute: latency
        init: [5]
        step: 5
        steps: 1
  triangle:
    type: custom
    nodes: 3
    adjacency:
      - [0, 1, 1]
      - [1, 0, 1]
      - [1, 1, 0]
    sweep:
      - attribute: loss
        init: [1]
        step: 1
        steps: 4
"#;

fn template(name: &str) -> TopologyTemplate {
    let source = YamlSource::from_yaml(SUITE, "/suite").unwrap();
    TopologyResolver::new(&source).resolve(name).unwrap()
}

#[test]
fn test_two_sweeps_expand_to_sixteen_variants() {
    let template = template("pair");
    let expander = VariantExpander::new(&template);
    assert_eq!(expander.len(), 16);

    let first = expander.variant(0).unwrap();
    assert_eq!(first.links.len(), 1);
    assert_eq!(first.links[0].params.loss, 2.0);
    assert_eq!(first.links[0].params.latency_ms, 10.0);
    assert_eq!(first.links[0].params.jitter_ms, 1.0);

    // latency is the inner loop
    let second = expander.variant(1).unwrap();
    assert_eq!(second.links[0].params.loss, 2.0);
    assert_eq!(second.links[0].params.latency_ms, 30.0);

    let fifth = expander.variant(4).unwrap();
    assert_eq!(fifth.links[0].params.loss, 4.0);
    assert_eq!(fifth.links[0].params.latency_ms, 10.0);

    let last = expander.variant(15).unwrap();
    assert_eq!(last.links[0].params.loss, 8.0);
    assert_eq!(last.links[0].params.latency_ms, 70.0);
    assert_eq!(
        last.swept,
        vec![(LinkAttribute::Loss, 8.0), (LinkAttribute::Latency, 70.0)]
    );

    assert!(expander.variant(16).is_none());
}

#[test]
fn test_ordinals_are_dense_and_parameters_unique() {
    let template = template("pair");
    let expander = VariantExpander::new(&template);

    let variants: Vec<_> = expander.iter().collect();
    assert_eq!(variants.len(), expander.len());
    for (index, variant) in variants.iter().enumerate() {
        assert_eq!(variant.ordinal, index);
        assert_eq!(variant.dir_name(), format!("topology-{}", index));
    }

    let combinations: HashSet<String> = variants
        .iter()
        .map(|v| format!("{:?}", v.swept))
        .collect();
    assert_eq!(combinations.len(), 16);
}

#[test]
fn test_expansion_is_deterministic() {
    let a = template("chain");
    let b = template("chain");
    let first: Vec<_> = VariantExpander::new(&a).iter().collect();
    let second: Vec<_> = VariantExpander::new(&b).iter().collect();
    assert_eq!(first, second);
}

#[test]
fn test_per_link_baselines() {
    let template = template("chain");
    let expander = VariantExpander::new(&template);
    // the fixed bandwidth attribute contributes a single value
    assert_eq!(expander.len(), 3);

    let last = expander.variant(2).unwrap();
    let losses: Vec<f64> = last.links.iter().map(|l| l.params.loss).collect();
    assert_eq!(losses, vec![1.0, 2.0, 3.0]);
    let rates: Vec<Option<f64>> = last.links.iter().map(|l| l.params.bw_fwd).collect();
    assert_eq!(rates, vec![Some(100.0), Some(50.0), Some(25.0)]);
    assert_eq!(last.swept, vec![(LinkAttribute::Loss, 1.0)]);
}

#[test]
fn test_mesh_broadcasts_single_baseline() {
    let template = template("ring");
    let expander = VariantExpander::new(&template);
    assert_eq!(expander.len(), 2);

    let variant = expander.variant(1).unwrap();
    assert_eq!(variant.links.len(), 6);
    assert!(variant.links.iter().all(|l| l.params.latency_ms == 10.0));
}

#[test]
fn test_custom_template_yields_single_variant() {
    let template = template("triangle");
    let expander = VariantExpander::new(&template);
    assert_eq!(expander.len(), 1);

    let only = expander.variant(0).unwrap();
    assert_eq!(only.links.len(), 3);
    assert!(only.swept.is_empty());
}

#[test]
fn test_description_first_line() {
    let template = template("pair");
    let variant = VariantExpander::new(&template).variant(5).unwrap();
    let description = variant.describe();
    let first_line = description.lines().next().unwrap();
    assert!(first_line.starts_with("loss 4% latency 30 ms"), "{}", first_line);
}

/// Random sweep shapes: cardinality is the product of the value counts and
/// each ordinal decodes to a distinct parameter combination.
#[test]
fn test_random_sweeps_cover_the_product() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let attributes = ["loss", "latency", "jitter", "bandwidth_forward"];

    for _ in 0..20 {
        let nodes = rng.gen_range(2..6);
        let links = nodes - 1;
        let count = rng.gen_range(1..=attributes.len());
        let mut expected = 1usize;
        let mut sweep = String::new();
        for attribute in &attributes[..count] {
            let steps: u32 = rng.gen_range(0..4);
            expected *= steps as usize + 1;
            let base: Vec<String> = (0..links).map(|_| rng.gen_range(1..10).to_string()).collect();
            sweep.push_str(&format!(
                "      - attribute: {}\n        init: [{}]\n        step: 1\n        steps: {}\n",
                attribute,
                base.join(", "),
                steps
            ));
        }
        let yaml = format!(
            "topologies:\n  random:\n    type: linear\n    nodes: {}\n    sweep:\n{}",
            nodes, sweep
        );

        let source = YamlSource::from_yaml(&yaml, "/suite").unwrap();
        let template = TopologyResolver::new(&source).resolve("random").unwrap();
        let expander = VariantExpander::new(&template);
        assert_eq!(expander.len(), expected, "{}", yaml);

        let distinct: HashSet<String> = expander
            .iter()
            .map(|v| format!("{:?}", v.links.iter().map(|l| l.params).collect::<Vec<_>>()))
            .collect();
        assert_eq!(distinct.len(), expected);
    }
}

#[test]
fn test_progressions_are_monotonic() {
    let template = template("pair");
    for sweep in &template.sweeps {
        let values = sweep.progression(0);
        assert_eq!(values.len(), 4);
        assert!(values.windows(2).all(|w| w[0] < w[1]));
    }
}
