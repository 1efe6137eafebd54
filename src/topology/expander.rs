//! Sweep expansion.
//!
//! The variant set of a template is the Cartesian product of the value
//! progressions of its sweeps. Ordinals are decoded as a mixed-radix number
//! whose most significant digit is the first declared sweep, so iterating
//! ordinals in order reproduces a nested loop with the first attribute
//! outermost.

use std::iter::FusedIterator;

use super::types::{Link, TopologyKind, TopologyTemplate, TopologyVariant};

/// Derives ordinal-numbered variants from a template
#[derive(Debug, Clone)]
pub struct VariantExpander<'a> {
    template: &'a TopologyTemplate,
    pairs: Vec<(usize, usize)>,
    radices: Vec<usize>,
    total: usize,
}

impl<'a> VariantExpander<'a> {
    pub fn new(template: &'a TopologyTemplate) -> Self {
        let radices: Vec<usize> = match template.kind {
            TopologyKind::Custom => Vec::new(),
            _ => template.sweeps.iter().map(|s| s.cardinality()).collect(),
        };
        let total = radices.iter().fold(1usize, |acc, &r| acc.saturating_mul(r));
        Self {
            template,
            pairs: template.link_pairs(),
            radices,
            total,
        }
    }

    /// Number of variants
    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Variant with the given ordinal, `None` past the end
    pub fn variant(&self, ordinal: usize) -> Option<TopologyVariant> {
        if ordinal >= self.total {
            return None;
        }

        let digits = self.decode(ordinal);
        let links = self
            .pairs
            .iter()
            .enumerate()
            .map(|(index, &(a, b))| {
                let mut params = self.template.base_link;
                for (sweep, &digit) in self.template.sweeps.iter().zip(&digits) {
                    params.set(sweep.attribute, sweep.value(index, digit));
                }
                Link { a, b, params }
            })
            .collect();

        let swept = self
            .template
            .sweeps
            .iter()
            .zip(&digits)
            .filter(|(sweep, _)| sweep.is_swept())
            .map(|(sweep, &digit)| (sweep.attribute, sweep.value(0, digit)))
            .collect();

        Some(TopologyVariant {
            ordinal,
            template: self.template.name.clone(),
            kind: self.template.kind,
            nodes: self.template.nodes,
            links,
            swept,
        })
    }

    /// Restartable iterator over all variants in ordinal order
    pub fn iter(&self) -> Variants<'_, 'a> {
        Variants {
            expander: self,
            next: 0,
        }
    }

    /// Progression index of every sweep for `ordinal`; last sweep varies fastest
    fn decode(&self, ordinal: usize) -> Vec<usize> {
        let mut digits = vec![0; self.radices.len()];
        let mut rest = ordinal;
        for (digit, &radix) in digits.iter_mut().zip(&self.radices).rev() {
            *digit = rest % radix;
            rest /= radix;
        }
        digits
    }
}

impl<'e, 'a> IntoIterator for &'e VariantExpander<'a> {
    type Item = TopologyVariant;
    type IntoIter = Variants<'e, 'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator returned by [`VariantExpander::iter`]
#[derive(Debug, Clone)]
pub struct Variants<'e, 'a> {
    expander: &'e VariantExpander<'a>,
    next: usize,
}

impl Iterator for Variants<'_, '_> {
    type Item = TopologyVariant;

    fn next(&mut self) -> Option<Self::Item> {
        let variant = self.expander.variant(self.next)?;
        self.next += 1;
        Some(variant)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.expander.len().saturating_sub(self.next);
        (remaining, Some(remaining))
    }

    fn nth(&mut self, n: usize) -> Option<Self::Item> {
        self.next = self.next.saturating_add(n);
        self.next()
    }
}

impl ExactSizeIterator for Variants<'_, '_> {}

impl FusedIterator for Variants<'_, '_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::types::{LinkAttribute, LinkParams, ParameterSweep};

    fn chain(nodes: usize, sweeps: Vec<ParameterSweep>) -> TopologyTemplate {
        TopologyTemplate {
            name: "chain".to_string(),
            kind: TopologyKind::Linear,
            nodes,
            sweeps,
            base_link: LinkParams::default(),
            adjacency: None,
        }
    }

    fn sweep(attribute: LinkAttribute, baseline: Vec<f64>, step: f64, steps: u32) -> ParameterSweep {
        ParameterSweep {
            attribute,
            baseline,
            step: Some(step),
            steps,
        }
    }

    #[test]
    fn test_no_sweeps_single_variant() {
        let template = chain(3, Vec::new());
        let expander = VariantExpander::new(&template);
        assert_eq!(expander.len(), 1);
        let variant = expander.variant(0).unwrap();
        assert_eq!(variant.links.len(), 2);
        assert!(variant.swept.is_empty());
        assert!(expander.variant(1).is_none());
    }

    #[test]
    fn test_first_attribute_is_outermost() {
        let template = chain(
            2,
            vec![
                sweep(LinkAttribute::Loss, vec![0.0], 1.0, 1),
                sweep(LinkAttribute::Latency, vec![10.0], 10.0, 2),
            ],
        );
        let expander = VariantExpander::new(&template);
        let order: Vec<(f64, f64)> = expander
            .iter()
            .map(|v| (v.links[0].params.loss, v.links[0].params.latency_ms))
            .collect();
        assert_eq!(
            order,
            vec![
                (0.0, 10.0),
                (0.0, 20.0),
                (0.0, 30.0),
                (1.0, 10.0),
                (1.0, 20.0),
                (1.0, 30.0),
            ]
        );
    }

    #[test]
    fn test_per_link_baseline() {
        let template = chain(3, vec![sweep(LinkAttribute::Latency, vec![5.0, 50.0], 5.0, 1)]);
        let expander = VariantExpander::new(&template);
        let last = expander.variant(1).unwrap();
        assert_eq!(last.links[0].params.latency_ms, 10.0);
        assert_eq!(last.links[1].params.latency_ms, 55.0);
        assert_eq!(last.swept, vec![(LinkAttribute::Latency, 10.0)]);
    }

    #[test]
    fn test_iterator_is_exact_and_restartable() {
        let template = chain(2, vec![sweep(LinkAttribute::Jitter, vec![0.0], 1.0, 4)]);
        let expander = VariantExpander::new(&template);
        let mut iter = expander.iter();
        assert_eq!(iter.len(), 5);
        iter.next();
        assert_eq!(iter.len(), 4);
        assert_eq!(iter.nth(2).map(|v| v.ordinal), Some(3));

        let first: Vec<usize> = expander.iter().map(|v| v.ordinal).collect();
        let second: Vec<usize> = (&expander).into_iter().map(|v| v.ordinal).collect();
        assert_eq!(first, vec![0, 1, 2, 3, 4]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_custom_template_single_variant() {
        let template = TopologyTemplate {
            name: "triangle".to_string(),
            kind: TopologyKind::Custom,
            nodes: 3,
            sweeps: Vec::new(),
            base_link: LinkParams {
                latency_ms: 20.0,
                ..LinkParams::default()
            },
            adjacency: Some(vec![vec![0, 1, 1], vec![1, 0, 1], vec![1, 1, 0]]),
        };
        let expander = VariantExpander::new(&template);
        assert_eq!(expander.len(), 1);
        let variant = expander.variant(0).unwrap();
        assert_eq!(variant.links.len(), 3);
        assert!(variant.links.iter().all(|l| l.params.latency_ms == 20.0));
    }
}
