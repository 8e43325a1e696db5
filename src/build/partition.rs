//! Top-level tree from a feature sequence: each level splits the units by the
//! value of the next feature in the sequence.

use crate::features::{FeatureSchema, FeatureVector};
use crate::tree::{NodeId, NodeKind, Rule, Tree};
use rustc_hash::FxHashMap;

/// Partitions `vectors` recursively over `sequence`.
///
/// Each decision node gets one child per value observed among its units, in
/// order of first appearance. A subset becomes a leaf once the sequence is
/// used up or it holds at most one unit. Every feature in `sequence` must be
/// an enum feature of `schema`.
pub fn build_from_sequence(vectors: Vec<FeatureVector>, sequence: &[usize], schema: &FeatureSchema) -> Tree {
    debug_assert!(sequence.iter().all(|&f| schema.kind(f).is_enum()));
    let (kind, groups) = split(vectors, sequence);
    let mut tree = Tree::new(kind);
    let root = tree.root();
    attach(&mut tree, root, groups, sequence.get(1..).unwrap_or(&[]));
    tree.relink_leaves();
    tracing::debug!(
        nodes = tree.len(),
        leaves = tree.leaf_count(),
        depth = tree.height(),
        "partitioned over {} features",
        sequence.len()
    );
    tree
}

fn attach(tree: &mut Tree, parent: NodeId, groups: Vec<Vec<FeatureVector>>, rest: &[usize]) {
    for group in groups {
        let (kind, subgroups) = split(group, rest);
        let id = tree.add_child(parent, kind);
        attach(tree, id, subgroups, rest.get(1..).unwrap_or(&[]));
    }
}

/// Node for `vectors` at the level of `sequence[0]`, with the unit groups of
/// its children.
fn split(vectors: Vec<FeatureVector>, sequence: &[usize]) -> (NodeKind, Vec<Vec<FeatureVector>>) {
    let Some(&feature) = sequence.first() else {
        return (NodeKind::vectors(vectors), Vec::new());
    };
    if vectors.len() <= 1 {
        return (NodeKind::vectors(vectors), Vec::new());
    }

    let mut slot_of: FxHashMap<u16, usize> = FxHashMap::default();
    let mut values = Vec::new();
    let mut groups: Vec<Vec<FeatureVector>> = Vec::new();
    for fv in vectors {
        let value = fv.enum_value(feature);
        let slot = *slot_of.entry(value).or_insert_with(|| {
            values.push(value);
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(fv);
    }
    (NodeKind::decision(feature, Rule::OneOf(values)), groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::LeafData;

    fn schema() -> FeatureSchema {
        FeatureSchema::builder()
            .byte("A", &["0", "1"])
            .byte("B", &["x", "y"])
            .build()
            .unwrap()
    }

    fn fv(unit: u32, a: u8, b: u8) -> FeatureVector {
        FeatureVector::new(unit, vec![a, b], vec![], vec![])
    }

    #[test]
    fn children_follow_first_appearance() {
        let vectors = vec![fv(0, 1, 1), fv(1, 0, 0), fv(2, 1, 0), fv(3, 0, 0)];
        let tree = build_from_sequence(vectors, &[0, 1], &schema());
        let root = tree.decision(tree.root()).unwrap();
        assert_eq!(root.rule, Rule::OneOf(vec![1, 0]));
        let first = tree.decision(root.children[0]).unwrap();
        assert_eq!(first.rule, Rule::OneOf(vec![1, 0]));
        // the A=0 group only ever shows B=x
        let second = tree.decision(root.children[1]).unwrap();
        assert_eq!(second.rule, Rule::OneOf(vec![0]));
        assert!(tree.check_leaf_chain());
    }

    #[test]
    fn singleton_subset_becomes_leaf() {
        let vectors = vec![fv(0, 1, 1), fv(1, 0, 0), fv(2, 0, 1)];
        let tree = build_from_sequence(vectors, &[0, 1], &schema());
        let root = tree.decision(tree.root()).unwrap();
        let lone = tree.leaf(root.children[0]).unwrap();
        assert_eq!(lone.data, LeafData::Vectors(vec![fv(0, 1, 1)]));
    }

    #[test]
    fn empty_sequence_gives_single_leaf() {
        let vectors = vec![fv(0, 1, 1), fv(1, 0, 0)];
        let tree = build_from_sequence(vectors, &[], &schema());
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.population(), 2);
    }
}
