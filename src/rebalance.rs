//! Leaf size policy for the top-level tree.
//!
//! Small leaves are only reported. Leaves above the maximum keep their first
//! `max` units and drop the rest. The tree shape never changes.

use crate::features::FeatureSchema;
use crate::tree::{LeafData, NodeId, Tree};
use serde::Serialize;

/// Decision-path fragments of leaves that are legitimately rare: silence
/// units and vowel-context combinations that cannot occur. Matched as plain
/// substrings of the decision path.
fn is_exempt(path: &str) -> bool {
    path.contains("phone==0")
        || path.contains("vc==0")
        || (path.contains("prev_vc==+") && path.contains("prev_c"))
        || (path.contains("prev_vc==-") && path.contains("prev_vheight"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeafStatus {
    Ok,
    TooSmall,
    TooSmallExempt,
    TooBig,
}

impl LeafStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LeafStatus::Ok => "ok",
            LeafStatus::TooSmall => "too_small",
            LeafStatus::TooSmallExempt => "too_small_exempt",
            LeafStatus::TooBig => "too_big",
        }
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct RebalanceReport {
    pub too_small: usize,
    pub too_big: usize,
    /// Number of leaves inspected.
    pub total: usize,
    /// Units removed from oversized leaves.
    pub dropped_units: usize,
    #[serde(skip)]
    pub statuses: Vec<(NodeId, LeafStatus)>,
}

impl RebalanceReport {
    pub fn status_of(&self, leaf: NodeId) -> Option<LeafStatus> {
        self.statuses.iter().find(|(id, _)| *id == leaf).map(|(_, s)| *s)
    }
}

/// Applies the leaf size policy along the leaf chain.
pub fn rebalance(tree: &mut Tree, schema: &FeatureSchema, min_size: usize, max_size: usize) -> RebalanceReport {
    let mut report = RebalanceReport::default();
    let leaves: Vec<NodeId> = tree.leaves().collect();

    for id in leaves {
        report.total += 1;
        let size = tree.leaf(id).map_or(0, |l| l.data.len());

        let status = if size < min_size {
            let path = tree.decision_path(id, schema);
            if is_exempt(&path) {
                LeafStatus::TooSmallExempt
            } else {
                tracing::warn!(leaf = id, units = size, path = %path, "leaf below minimum size {min_size}");
                report.too_small += 1;
                LeafStatus::TooSmall
            }
        } else if size > max_size {
            if let Some(leaf) = tree.leaf_mut(id) {
                match &mut leaf.data {
                    LeafData::Vectors(v) => v.truncate(max_size),
                    LeafData::Units(u) => u.truncate(max_size),
                }
            }
            tracing::warn!(
                leaf = id,
                units = size,
                path = %tree.decision_path(id, schema),
                "leaf above maximum size, truncated to {max_size}"
            );
            report.too_big += 1;
            report.dropped_units += size - max_size;
            LeafStatus::TooBig
        } else {
            LeafStatus::Ok
        };
        report.statuses.push((id, status));
    }

    tracing::info!(
        leaves = report.total,
        too_small = report.too_small,
        too_big = report.too_big,
        "leaf sizes checked"
    );
    report
}
