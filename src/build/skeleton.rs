use crate::features::FeatureVector;
use crate::tree::{LeafData, Tree};
use serde::Serialize;

/// Outcome of distributing units over a skeleton.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FillReport {
    pub placed: usize,
    /// Units whose values lead to a multi-way node with no matching branch.
    pub dropped: usize,
}

/// Walks every vector down `skeleton` and appends it to the leaf it reaches.
///
/// Unit lists already present on skeleton leaves are discarded. Vectors with
/// no matching branch are dropped and counted.
pub fn fill_skeleton(mut skeleton: Tree, vectors: Vec<FeatureVector>) -> (Tree, FillReport) {
    let leaves: Vec<_> = skeleton.leaves().collect();
    for id in leaves {
        if let Some(leaf) = skeleton.leaf_mut(id) {
            if !leaf.data.is_empty() {
                tracing::debug!(leaf = id, units = leaf.data.len(), "clearing units listed in skeleton leaf");
            }
            leaf.data = LeafData::Vectors(Vec::new());
        }
    }

    let mut report = FillReport::default();
    for fv in vectors {
        let target = skeleton.descend(&fv);
        match target.and_then(|id| skeleton.leaf_mut(id)) {
            Some(leaf) => {
                if let LeafData::Vectors(list) = &mut leaf.data {
                    list.push(fv);
                    report.placed += 1;
                }
            }
            None => {
                tracing::debug!(unit = fv.unit_index(), "no skeleton branch matches unit, dropped");
                report.dropped += 1;
            }
        }
    }

    if report.dropped > 0 {
        tracing::warn!(
            dropped = report.dropped,
            placed = report.placed,
            "units without a matching skeleton branch were dropped"
        );
    }
    (skeleton, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::parse_tree;
    use crate::features::FeatureSchema;

    fn schema() -> FeatureSchema {
        FeatureSchema::builder()
            .byte("phone", &["0", "a", "e", "i"])
            .build()
            .unwrap()
    }

    fn fv(unit: u32, phone: u8) -> FeatureVector {
        FeatureVector::new(unit, vec![phone], vec![], vec![])
    }

    #[test]
    fn vectors_land_in_matching_leaves() {
        let skeleton = parse_tree("((phone is a) ((() 0)) ((() 0)))", &schema()).unwrap();
        let (tree, report) = fill_skeleton(skeleton, vec![fv(0, 1), fv(1, 2), fv(2, 1)]);
        assert_eq!(report, FillReport { placed: 3, dropped: 0 });
        let sizes: Vec<usize> = tree.leaves().map(|id| tree.leaf(id).unwrap().data.len()).collect();
        assert_eq!(sizes, vec![2, 1]);
    }

    #[test]
    fn unmatched_vectors_are_counted_not_fatal() {
        let skeleton = parse_tree("((phone in a e) ((() 0)) ((() 0)))", &schema()).unwrap();
        let (tree, report) = fill_skeleton(skeleton, vec![fv(0, 1), fv(1, 3), fv(2, 0)]);
        assert_eq!(report, FillReport { placed: 1, dropped: 2 });
        assert_eq!(tree.population(), 1);
    }

    #[test]
    fn default_branch_catches_other_values() {
        let skeleton = parse_tree("((phone in a) ((() 0)) ((() 0)))", &schema()).unwrap();
        let (tree, report) = fill_skeleton(skeleton, vec![fv(0, 1), fv(1, 3)]);
        assert_eq!(report.dropped, 0);
        assert_eq!(tree.population(), 2);
    }
}
