//! Binary tree file: header, node count, tree name, then nodes in pre-order.
//!
//! Each decision node writes a kind tag, its feature index, the rule payload
//! and its child count, followed by its children. Each leaf writes the kind tag
//! and its unit indices.

use crate::error::{Error, Result};
use crate::features::FeatureSchema;
use crate::header::{
    expect_eof, read_count, read_f32, read_header, read_i32, read_str, write_count, write_f32,
    write_header, write_i32, write_str, ContentType,
};
use crate::tree::{NodeId, NodeKind, Rule, Tree};
use std::io::{Read, Write};

use super::check_decision;

const KIND_EQUALS: i32 = 0;
const KIND_LESS_THAN: i32 = 1;
const KIND_ONE_OF: i32 = 2;
const KIND_LEAF: i32 = 3;

/// A tree read from a binary file together with its stored name.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedTree {
    pub name: String,
    pub tree: Tree,
}

pub fn dump<W: Write>(tree: &Tree, name: &str, w: &mut W) -> Result<()> {
    write_header(w, ContentType::Tree)?;
    write_count(w, tree.len(), "node count")?;
    write_str(w, name)?;
    let written = dump_node(tree, tree.root(), w)?;
    if written != tree.len() {
        return Err(Error::format(
            "tree dump",
            format!("{} of {} arena nodes are reachable from the root", written, tree.len()),
        ));
    }
    Ok(())
}

/// Writes the subtree at `id`, returning the number of nodes written.
fn dump_node<W: Write>(tree: &Tree, id: NodeId, w: &mut W) -> Result<usize> {
    match &tree.node(id).kind {
        NodeKind::Leaf(leaf) => {
            write_i32(w, KIND_LEAF)?;
            let units = leaf.data.unit_indices();
            write_count(w, units.len(), "leaf size")?;
            for u in units {
                write_count(w, u as usize, "unit index")?;
            }
            Ok(1)
        }
        NodeKind::Decision(d) => {
            match &d.rule {
                Rule::Equals(v) => {
                    write_i32(w, KIND_EQUALS)?;
                    write_count(w, d.feature, "feature index")?;
                    write_i32(w, *v as i32)?;
                }
                Rule::LessThan(t) => {
                    write_i32(w, KIND_LESS_THAN)?;
                    write_count(w, d.feature, "feature index")?;
                    write_f32(w, *t)?;
                }
                Rule::OneOf(values) => {
                    write_i32(w, KIND_ONE_OF)?;
                    write_count(w, d.feature, "feature index")?;
                    write_count(w, values.len(), "value count")?;
                    for v in values {
                        write_i32(w, *v as i32)?;
                    }
                }
            }
            write_count(w, d.children.len(), "child count")?;
            let mut written = 1;
            for &child in &d.children {
                written += dump_node(tree, child, w)?;
            }
            Ok(written)
        }
    }
}

/// Reads a binary tree, checking every decision against `schema`.
pub fn load<R: Read>(r: &mut R, schema: &FeatureSchema, context: &str) -> Result<LoadedTree> {
    read_header(r, ContentType::Tree, context)?;
    let node_count = read_count(r, context, "node")?;
    let name = read_str(r, context)?;

    let mut reader = NodeReader {
        r,
        schema,
        context,
        remaining: node_count,
    };
    let root = reader.read_kind()?;
    let mut tree = Tree::new(root.0);
    let root_id = tree.root();
    reader.read_children(&mut tree, root_id, root.1)?;
    if reader.remaining != 0 {
        return Err(Error::format(
            context,
            format!("header announces {node_count} nodes, found {}", node_count - reader.remaining),
        ));
    }
    expect_eof(reader.r, context)?;
    tree.relink_leaves();
    Ok(LoadedTree { name, tree })
}

struct NodeReader<'a, R: Read> {
    r: &'a mut R,
    schema: &'a FeatureSchema,
    context: &'a str,
    remaining: usize,
}

impl<R: Read> NodeReader<'_, R> {
    /// Reads one node record, returning its kind and child count.
    fn read_kind(&mut self) -> Result<(NodeKind, usize)> {
        let ctx = self.context;
        if self.remaining == 0 {
            return Err(Error::format(ctx, "more nodes than the header announces"));
        }
        self.remaining -= 1;

        let tag = read_i32(self.r, ctx)?;
        if tag == KIND_LEAF {
            let n = read_count(self.r, ctx, "leaf size")?;
            let mut units = Vec::with_capacity(n.min(1 << 16));
            for _ in 0..n {
                let u = read_count(self.r, ctx, "unit index")?;
                units.push(u as u32);
            }
            return Ok((NodeKind::units(units), 0));
        }

        let feature = read_count(self.r, ctx, "feature index")?;
        let rule = match tag {
            KIND_EQUALS => Rule::Equals(self.read_value()?),
            KIND_LESS_THAN => Rule::LessThan(read_f32(self.r, ctx)?),
            KIND_ONE_OF => {
                let k = read_count(self.r, ctx, "value")?;
                let values = (0..k).map(|_| self.read_value()).collect::<Result<_>>()?;
                Rule::OneOf(values)
            }
            other => return Err(Error::format(ctx, format!("unknown node kind {other}"))),
        };
        let children = read_count(self.r, ctx, "child")?;
        check_decision(self.schema, feature, &rule, children).map_err(|m| Error::format(ctx, m))?;
        Ok((NodeKind::decision(feature, rule), children))
    }

    fn read_value(&mut self) -> Result<u16> {
        let v = read_i32(self.r, self.context)?;
        u16::try_from(v).map_err(|_| Error::format(self.context, format!("enum value {v} out of range")))
    }

    fn read_children(&mut self, tree: &mut Tree, parent: NodeId, count: usize) -> Result<()> {
        for _ in 0..count {
            let (kind, grandchildren) = self.read_kind()?;
            let id = tree.add_child(parent, kind);
            self.read_children(tree, id, grandchildren)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn schema() -> FeatureSchema {
        FeatureSchema::builder()
            .byte("phone", &["0", "a", "e", "i"])
            .float("unit_duration")
            .build()
            .unwrap()
    }

    fn tree() -> Tree {
        let mut t = Tree::new(NodeKind::decision(0, Rule::OneOf(vec![1, 2])));
        let a = t.add_child(0, NodeKind::decision(1, Rule::LessThan(0.07)));
        t.add_child(a, NodeKind::units(vec![10, 11]));
        t.add_child(a, NodeKind::units(vec![12]));
        let e = t.add_child(0, NodeKind::decision(0, Rule::Equals(2)));
        t.add_child(e, NodeKind::units(vec![]));
        t.add_child(e, NodeKind::units(vec![3, 4, 5]));
        t.add_child(0, NodeKind::units(vec![99]));
        t.relink_leaves();
        t
    }

    #[test]
    fn dump_then_load_reproduces_tree() {
        let t = tree();
        let mut buf = Vec::new();
        dump(&t, "halfphone", &mut buf).unwrap();
        let loaded = load(&mut Cursor::new(buf), &schema(), "mem").unwrap();
        assert_eq!(loaded.name, "halfphone");
        assert_eq!(loaded.tree, t);
    }

    #[test]
    fn node_count_mismatch_is_format_error() {
        let mut buf = Vec::new();
        dump(&tree(), "", &mut buf).unwrap();
        // node count sits right after the 12-byte header
        buf[15] += 1;
        let err = load(&mut Cursor::new(buf), &schema(), "mem").unwrap_err();
        assert!(err.to_string().contains("announces"), "{err}");
    }

    #[test]
    fn unknown_feature_is_format_error() {
        let other = FeatureSchema::builder().float("unit_duration").build().unwrap();
        let mut buf = Vec::new();
        dump(&tree(), "", &mut buf).unwrap();
        let err = load(&mut Cursor::new(buf), &other, "mem").unwrap_err();
        assert!(matches!(err, Error::Format { .. }));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut buf = Vec::new();
        dump(&tree(), "", &mut buf).unwrap();
        buf.push(0);
        assert!(load(&mut Cursor::new(buf), &schema(), "mem").is_err());
    }
}
