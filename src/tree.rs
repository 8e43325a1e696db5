//! Defines the classification tree: an arena of decision and leaf nodes
//! addressed by `NodeId`, with parent links on every node and a doubly linked
//! chain through the leaves in left-to-right order.

use crate::features::{FeatureKind, FeatureSchema, FeatureVector};
use std::fmt::Write;

/// Type alias for a node identifier within a `Tree`.
pub type NodeId = usize;

/// Branch policy of a decision node.
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    /// Enum field equality: child 0 when the value matches, child 1 otherwise.
    Equals(u16),
    /// Float field ordering: child 0 when below the threshold, child 1 otherwise.
    LessThan(f32),
    /// Enum field multi-way split: child `i` for `values[i]`. A decision with
    /// one more child than values sends every other value to the last child.
    OneOf(Vec<u16>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecisionNode {
    pub feature: usize,
    pub rule: Rule,
    pub children: Vec<NodeId>,
}

impl DecisionNode {
    /// Number of children the rule calls for, without a default branch.
    pub fn arity(&self) -> usize {
        match &self.rule {
            Rule::Equals(_) | Rule::LessThan(_) => 2,
            Rule::OneOf(values) => values.len(),
        }
    }

    /// Whether a multi-way node carries a trailing "don't care" child.
    pub fn has_default(&self) -> bool {
        matches!(self.rule, Rule::OneOf(_)) && self.children.len() == self.arity() + 1
    }

    /// Position of the child `fv` follows, or `None` when no branch matches.
    pub fn branch_for(&self, fv: &FeatureVector) -> Option<usize> {
        match &self.rule {
            Rule::Equals(v) => Some(if fv.enum_value(self.feature) == *v { 0 } else { 1 }),
            Rule::LessThan(t) => Some(if fv.float_value(self.feature) < *t { 0 } else { 1 }),
            Rule::OneOf(values) => {
                let value = fv.enum_value(self.feature);
                match values.iter().position(|v| *v == value) {
                    Some(pos) => Some(pos),
                    None if self.has_default() => Some(values.len()),
                    None => None,
                }
            }
        }
    }

    /// Condition text for the branch at `pos`, as it appears in a decision path.
    pub fn branch_label(&self, pos: usize, schema: &FeatureSchema) -> String {
        let name = schema.name(self.feature);
        match &self.rule {
            Rule::Equals(v) => {
                let op = if pos == 0 { "==" } else { "!=" };
                format!("{name}{op}{}", schema.display_value(self.feature, *v))
            }
            Rule::LessThan(t) => {
                let op = if pos == 0 { "<" } else { ">=" };
                format!("{name}{op}{t}")
            }
            Rule::OneOf(values) => match values.get(pos) {
                Some(v) => format!("{name}=={}", schema.display_value(self.feature, *v)),
                None => format!("{name}==*"),
            },
        }
    }
}

/// Population of a leaf: feature vectors while the tree is being built,
/// plain unit indices once it has been finalised or read back from disk.
#[derive(Debug, Clone, PartialEq)]
pub enum LeafData {
    Vectors(Vec<FeatureVector>),
    Units(Vec<u32>),
}

impl LeafData {
    pub fn len(&self) -> usize {
        match self {
            LeafData::Vectors(v) => v.len(),
            LeafData::Units(u) => u.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn unit_indices(&self) -> Vec<u32> {
        match self {
            LeafData::Vectors(v) => v.iter().map(FeatureVector::unit_index).collect(),
            LeafData::Units(u) => u.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeafNode {
    pub data: LeafData,
    pub prev: Option<NodeId>,
    pub next: Option<NodeId>,
}

impl LeafNode {
    pub fn new(data: LeafData) -> Self {
        LeafNode {
            data,
            prev: None,
            next: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Decision(DecisionNode),
    Leaf(LeafNode),
}

impl NodeKind {
    /// A decision node with no children yet.
    pub fn decision(feature: usize, rule: Rule) -> Self {
        NodeKind::Decision(DecisionNode {
            feature,
            rule,
            children: Vec::new(),
        })
    }

    pub fn vectors(vectors: Vec<FeatureVector>) -> Self {
        NodeKind::Leaf(LeafNode::new(LeafData::Vectors(vectors)))
    }

    pub fn units(units: Vec<u32>) -> Self {
        NodeKind::Leaf(LeafNode::new(LeafData::Units(units)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub parent: Option<NodeId>,
    pub kind: NodeKind,
}

/// Arena-backed tree. Nodes are only ever added; a splice reuses the slot of
/// the leaf it replaces, so every slot stays reachable from the root.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    nodes: Vec<Node>,
    root: NodeId,
    first_leaf: Option<NodeId>,
}

impl Tree {
    /// Creates a tree holding only its root node.
    pub fn new(root: NodeKind) -> Self {
        let mut tree = Tree {
            nodes: vec![Node { parent: None, kind: root }],
            root: 0,
            first_leaf: None,
        };
        tree.relink_leaves();
        tree
    }

    /// Appends a node under `parent`, after the existing children.
    ///
    /// The leaf chain is not updated; call [`relink_leaves`](Self::relink_leaves)
    /// once construction is finished.
    /// # Panics
    /// Panics if `parent` is out of bounds or is a leaf.
    pub fn add_child(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            parent: Some(parent),
            kind,
        });
        match &mut self.nodes[parent].kind {
            NodeKind::Decision(d) => d.children.push(id),
            NodeKind::Leaf(_) => panic!("add_child called on leaf node {parent}"),
        }
        id
    }

    #[inline(always)]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of nodes in the arena.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// # Panics
    /// Panics if the `id` is out of bounds.
    #[inline(always)]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    /// # Panics
    /// Panics if the `id` is out of bounds.
    #[inline(always)]
    pub fn is_leaf(&self, id: NodeId) -> bool {
        matches!(self.nodes[id].kind, NodeKind::Leaf(_))
    }

    #[inline(always)]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub fn leaf(&self, id: NodeId) -> Option<&LeafNode> {
        match &self.nodes.get(id)?.kind {
            NodeKind::Leaf(l) => Some(l),
            NodeKind::Decision(_) => None,
        }
    }

    pub fn leaf_mut(&mut self, id: NodeId) -> Option<&mut LeafNode> {
        match &mut self.nodes.get_mut(id)?.kind {
            NodeKind::Leaf(l) => Some(l),
            NodeKind::Decision(_) => None,
        }
    }

    pub fn decision(&self, id: NodeId) -> Option<&DecisionNode> {
        match &self.nodes.get(id)?.kind {
            NodeKind::Decision(d) => Some(d),
            NodeKind::Leaf(_) => None,
        }
    }

    pub fn first_leaf(&self) -> Option<NodeId> {
        self.first_leaf
    }

    /// Iterates the leaf chain from the first leaf.
    pub fn leaves(&self) -> LeafChain<'_> {
        LeafChain {
            tree: self,
            next: self.first_leaf,
        }
    }

    /// Leaves in a fresh depth-first left-to-right traversal from `start`.
    pub fn leaves_below(&self, start: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            match &self.nodes[id].kind {
                NodeKind::Leaf(_) => out.push(id),
                NodeKind::Decision(d) => stack.extend(d.children.iter().rev()),
            }
        }
        out
    }

    /// Rebuilds the leaf chain from a depth-first traversal of the whole tree.
    pub fn relink_leaves(&mut self) {
        let order = self.leaves_below(self.root);
        self.first_leaf = order.first().copied();
        self.link_run(&order, None, None);
    }

    /// Links `run` as consecutive leaves between `before` and `after`.
    fn link_run(&mut self, run: &[NodeId], before: Option<NodeId>, after: Option<NodeId>) {
        for (pos, &id) in run.iter().enumerate() {
            let prev = if pos == 0 { before } else { Some(run[pos - 1]) };
            let next = run.get(pos + 1).copied().or(after);
            if let NodeKind::Leaf(leaf) = &mut self.nodes[id].kind {
                leaf.prev = prev;
                leaf.next = next;
            }
        }
        let (Some(&first), Some(&last)) = (run.first(), run.last()) else {
            return;
        };
        match before.and_then(|b| self.leaf_mut(b)) {
            Some(b) => b.next = Some(first),
            None => self.first_leaf = Some(first),
        }
        if let Some(a) = after.and_then(|a| self.leaf_mut(a)) {
            a.prev = Some(last);
        }
    }

    /// Whether the leaf chain visits exactly the leaves of a fresh
    /// depth-first traversal, in the same order, with consistent back links.
    pub fn check_leaf_chain(&self) -> bool {
        let expected = self.leaves_below(self.root);
        let mut seen = Vec::with_capacity(expected.len());
        let mut prev = None;
        let mut cursor = self.first_leaf;
        while let Some(id) = cursor {
            let Some(leaf) = self.leaf(id) else {
                return false;
            };
            if leaf.prev != prev || seen.len() > expected.len() {
                return false;
            }
            seen.push(id);
            prev = Some(id);
            cursor = leaf.next;
        }
        seen == expected
    }

    /// Follows `fv` from the root to a leaf. `None` when a multi-way node has
    /// no branch for the vector's value.
    pub fn descend(&self, fv: &FeatureVector) -> Option<NodeId> {
        let mut id = self.root;
        loop {
            match &self.nodes[id].kind {
                NodeKind::Leaf(_) => return Some(id),
                NodeKind::Decision(d) => {
                    let pos = d.branch_for(fv)?;
                    id = *d.children.get(pos)?;
                }
            }
        }
    }

    /// Conjunction of the branch conditions from the root down to `id`,
    /// joined with " - ".
    pub fn decision_path(&self, id: NodeId, schema: &FeatureSchema) -> String {
        let mut parts = Vec::new();
        let mut child = id;
        while let Some(parent) = self.nodes[child].parent {
            if let NodeKind::Decision(d) = &self.nodes[parent].kind {
                if let Some(pos) = d.children.iter().position(|&c| c == child) {
                    parts.push(d.branch_label(pos, schema));
                }
            }
            child = parent;
        }
        parts.reverse();
        parts.join(" - ")
    }

    /// Total number of units over all leaves.
    pub fn population(&self) -> usize {
        self.leaves_below(self.root)
            .into_iter()
            .filter_map(|id| self.leaf(id))
            .map(|l| l.data.len())
            .sum()
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves_below(self.root).len()
    }

    /// Height of the tree; a lone leaf has height 1.
    pub fn height(&self) -> usize {
        let mut max = 0;
        let mut stack = vec![(self.root, 1usize)];
        while let Some((id, depth)) = stack.pop() {
            max = max.max(depth);
            if let NodeKind::Decision(d) = &self.nodes[id].kind {
                stack.extend(d.children.iter().map(|&c| (c, depth + 1)));
            }
        }
        max
    }

    /// Replaces every feature-vector leaf by the unit indices it holds.
    pub fn finalize_leaves(&mut self) {
        for node in &mut self.nodes {
            if let NodeKind::Leaf(leaf) = &mut node.kind {
                if let LeafData::Vectors(_) = leaf.data {
                    leaf.data = LeafData::Units(leaf.data.unit_indices());
                }
            }
        }
    }

    /// Replaces the leaf `leaf` by `subtree`.
    ///
    /// The subtree root takes over the leaf's slot, so the parent's child list
    /// and the root handle stay valid; the remaining subtree nodes are moved to
    /// the end of the arena. The subtree's leaves take the leaf's place in the
    /// chain, in their own left-to-right order.
    /// # Panics
    /// Panics if `leaf` is out of bounds or is not a leaf.
    pub fn splice_leaf(&mut self, leaf: NodeId, subtree: Tree) {
        let (prev, next) = match self.leaf(leaf) {
            Some(l) => (l.prev, l.next),
            None => panic!("splice_leaf called on non-leaf node {leaf}"),
        };
        let parent = self.nodes[leaf].parent;
        let base = self.nodes.len();
        let sub_root = subtree.root;
        let map = |id: NodeId| -> NodeId {
            if id == sub_root {
                leaf
            } else if id < sub_root {
                base + id
            } else {
                base + id - 1
            }
        };

        for (id, mut node) in subtree.nodes.into_iter().enumerate() {
            node.parent = if id == sub_root { parent } else { node.parent.map(map) };
            match &mut node.kind {
                NodeKind::Decision(d) => d.children.iter_mut().for_each(|c| *c = map(*c)),
                NodeKind::Leaf(l) => {
                    l.prev = None;
                    l.next = None;
                }
            }
            if id == sub_root {
                self.nodes[leaf] = node;
            } else {
                self.nodes.push(node);
            }
        }

        let run = self.leaves_below(leaf);
        if self.first_leaf == Some(leaf) {
            self.first_leaf = None;
        }
        self.link_run(&run, prev, next);
    }

    /// Renders the tree with one node per line, for diagnostics.
    pub fn print_tree(&self, schema: &FeatureSchema) -> String {
        let mut out = String::new();
        self.print_node_recursive(self.root, schema, "", &mut out);
        out
    }

    fn print_node_recursive(&self, id: NodeId, schema: &FeatureSchema, prefix: &str, out: &mut String) {
        match &self.nodes[id].kind {
            NodeKind::Leaf(leaf) => {
                let _ = writeln!(out, "{prefix}Leaf({} units) [ID: {id}]", leaf.data.len());
            }
            NodeKind::Decision(d) => {
                let kind = match schema.kind(d.feature) {
                    FeatureKind::Float => "float",
                    _ => "enum",
                };
                let _ = writeln!(out, "{prefix}Node({} : {kind}) [ID: {id}]", schema.name(d.feature));
                let last = d.children.len().saturating_sub(1);
                for (pos, &child) in d.children.iter().enumerate() {
                    let connector = if pos == last { "`--" } else { "|--" };
                    let child_prefix = format!("{prefix}  {connector} {}: ", d.branch_label(pos, schema));
                    self.print_node_recursive(child, schema, &child_prefix, out);
                }
            }
        }
    }
}

pub struct LeafChain<'a> {
    tree: &'a Tree,
    next: Option<NodeId>,
}

impl Iterator for LeafChain<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.next?;
        self.next = self.tree.leaf(id).and_then(|l| l.next);
        Some(id)
    }
}
