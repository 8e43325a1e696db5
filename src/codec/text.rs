//! Text tree notation, as read and written by the learner and used for
//! hand-written skeleton trees.
//!
//! ```text
//! ((phone in "a" "e")
//!   ((unit_duration < 0.1)
//!     ((((0 0) (1 0)) 0))
//!     ((((2 0)) 0)))
//!   ((() 0)))
//! ```

use crate::error::{Error, Result};
use crate::features::{FeatureKind, FeatureSchema};
use crate::tree::{NodeId, NodeKind, Rule, Tree};
use std::io::Write;

use super::check_decision;
use super::sexpr::{self, SExpr};

/// A classified node expression: its node kind and the expressions of its
/// children (empty for leaves).
struct Parsed<'a> {
    kind: NodeKind,
    children: &'a [SExpr],
}

/// Parses a text tree against `schema`. Leaves hold unit indices; a
/// skeleton's leaves are usually empty.
pub fn parse_tree(text: &str, schema: &FeatureSchema) -> Result<Tree> {
    let expr = sexpr::parse_one(text)?;
    let root = classify(&expr, schema)?;
    let mut tree = Tree::new(root.kind);
    let root_id = tree.root();
    attach_children(&mut tree, root_id, root.children, schema)?;
    tree.relink_leaves();
    Ok(tree)
}

fn attach_children(tree: &mut Tree, parent: NodeId, children: &[SExpr], schema: &FeatureSchema) -> Result<()> {
    for child in children {
        let parsed = classify(child, schema)?;
        let id = tree.add_child(parent, parsed.kind);
        attach_children(tree, id, parsed.children, schema)?;
    }
    Ok(())
}

fn classify<'a>(expr: &'a SExpr, schema: &FeatureSchema) -> Result<Parsed<'a>> {
    let line = expr.line();
    let items = expr
        .as_list()
        .ok_or_else(|| Error::parse(line, "expected a node, found an atom"))?;

    if let Some(question) = items.first().filter(|q| is_question(q)) {
        let (feature, rule) = parse_question(question, schema)?;
        let children = &items[1..];
        check_decision(schema, feature, &rule, children.len()).map_err(|m| Error::parse(line, m))?;
        return Ok(Parsed {
            kind: NodeKind::decision(feature, rule),
            children,
        });
    }

    let units = parse_leaf(items, line)?;
    Ok(Parsed {
        kind: NodeKind::units(units),
        children: &[],
    })
}

/// A question is a list of at least three elements headed by a bare feature
/// name; leaf contents never start with a name.
fn is_question(expr: &SExpr) -> bool {
    let Some(items) = expr.as_list() else {
        return false;
    };
    if items.len() < 3 {
        return false;
    }
    match items[0].as_symbol() {
        Some(name) => {
            name.starts_with(|c: char| c.is_alphabetic() || c == '_')
                && !matches!(name, "nan" | "inf" | "NaN" | "Infinity")
        }
        None => false,
    }
}

fn parse_question(expr: &SExpr, schema: &FeatureSchema) -> Result<(usize, Rule)> {
    let line = expr.line();
    let items = expr.as_list().unwrap_or(&[]);
    let name = items[0].as_symbol().unwrap_or_default();
    let feature = schema
        .feature_index(name)
        .ok_or_else(|| Error::parse(line, format!("unknown feature '{name}'")))?;
    let op = items[1]
        .as_symbol()
        .ok_or_else(|| Error::parse(line, "expected an operator after the feature name"))?;
    let operands = &items[2..];
    let kind = schema.kind(feature);

    let enum_value = |operand: &SExpr| -> Result<u16> {
        let text = operand
            .as_atom()
            .ok_or_else(|| Error::parse(line, "expected a value, found a list"))?;
        schema
            .value_index(feature, text)
            .ok_or_else(|| Error::parse(line, format!("'{text}' is not a value of feature '{name}'")))
    };

    let rule = match op {
        "is" | "in" if !kind.is_enum() => {
            return Err(Error::parse(
                line,
                format!("operator '{op}' needs an enum feature, '{name}' is float"),
            ));
        }
        "is" => Rule::Equals(enum_value(single_operand(operands, op, line)?)?),
        "in" => Rule::OneOf(operands.iter().map(enum_value).collect::<Result<_>>()?),
        "<" => {
            let text = single_operand(operands, op, line)?.as_atom().unwrap_or_default();
            let threshold: f32 = text
                .parse()
                .map_err(|_| Error::parse(line, format!("'{text}' is not a number")))?;
            Rule::LessThan(threshold)
        }
        "isByteOf" | "isShortOf" => {
            let expected = if op == "isByteOf" { FeatureKind::Byte } else { FeatureKind::Short };
            if kind != expected {
                return Err(Error::parse(line, format!("operator '{op}' does not match feature '{name}'")));
            }
            let text = single_operand(operands, op, line)?.as_atom().unwrap_or_default();
            let n: u16 = text
                .parse()
                .map_err(|_| Error::parse(line, format!("'{text}' is not a value count")))?;
            Rule::OneOf((0..n).collect())
        }
        other => return Err(Error::parse(line, format!("unsupported operator '{other}'"))),
    };
    Ok((feature, rule))
}

fn single_operand<'a>(operands: &'a [SExpr], op: &str, line: usize) -> Result<&'a SExpr> {
    match operands {
        [one] => Ok(one),
        _ => Err(Error::parse(line, format!("operator '{op}' takes exactly one operand"))),
    }
}

/// Leaf: `((<pairs>) <score>)` wrapped in one list, where each pair is
/// `(<unit> <score>)`. Scores are accepted and dropped.
fn parse_leaf(items: &[SExpr], line: usize) -> Result<Vec<u32>> {
    let malformed = || Error::parse(line, "malformed leaf, expected ((<(unit score)...> score))");
    let [body] = items else {
        return Err(malformed());
    };
    let body = body.as_list().ok_or_else(malformed)?;
    let pairs = body.first().and_then(SExpr::as_list).ok_or_else(malformed)?;
    if body.len() > 2 {
        return Err(malformed());
    }

    let mut units = Vec::with_capacity(pairs.len());
    for pair in pairs {
        let first = pair
            .as_list()
            .and_then(|p| p.first())
            .and_then(SExpr::as_atom)
            .ok_or_else(|| Error::parse(pair.line(), "leaf entry must be (unit score)"))?;
        let unit: u32 = first.parse().map_err(|_| {
            Error::parse(pair.line(), format!("unit index '{first}' is not a non-negative integer"))
        })?;
        units.push(unit);
    }
    Ok(units)
}

fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

fn question_text(feature: usize, rule: &Rule, schema: &FeatureSchema) -> String {
    let name = schema.name(feature);
    let value = |v: u16| quote(&schema.display_value(feature, v));
    match rule {
        Rule::Equals(v) => format!("({name} is {})", value(*v)),
        Rule::LessThan(t) => format!("({name} < {t})"),
        Rule::OneOf(values) => {
            let list: Vec<String> = values.iter().map(|v| value(*v)).collect();
            format!("({name} in {})", list.join(" "))
        }
    }
}

/// Writes `tree` with one node per line, indented by depth.
pub fn write_tree<W: Write>(tree: &Tree, schema: &FeatureSchema, w: &mut W) -> Result<()> {
    write_node(tree, tree.root(), schema, 0, w)
}

fn write_node<W: Write>(tree: &Tree, id: NodeId, schema: &FeatureSchema, depth: usize, w: &mut W) -> Result<()> {
    let indent = "  ".repeat(depth);
    match &tree.node(id).kind {
        NodeKind::Leaf(leaf) => {
            let pairs: Vec<String> = leaf
                .data
                .unit_indices()
                .iter()
                .map(|u| format!("({u} 0)"))
                .collect();
            writeln!(w, "{indent}((({}) 0))", pairs.join(" "))?;
        }
        NodeKind::Decision(d) => {
            writeln!(w, "{indent}({}", question_text(d.feature, &d.rule, schema))?;
            for &child in &d.children {
                write_node(tree, child, schema, depth + 1, w)?;
            }
            writeln!(w, "{indent})")?;
        }
    }
    Ok(())
}

/// Text form of `tree` as a string.
pub fn to_text(tree: &Tree, schema: &FeatureSchema) -> Result<String> {
    let mut buf = Vec::new();
    write_tree(tree, schema, &mut buf)?;
    String::from_utf8(buf).map_err(|e| Error::format("text tree", e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::LeafData;

    fn schema() -> FeatureSchema {
        FeatureSchema::builder()
            .byte("phone", &["0", "a", "e", "say \"x\""])
            .short("pos", &["0", "n", "v"])
            .float("segment_duration")
            .build()
            .unwrap()
    }

    fn leaf_units(tree: &Tree) -> Vec<Vec<u32>> {
        tree.leaves()
            .map(|id| tree.leaf(id).unwrap().data.unit_indices())
            .collect()
    }

    #[test]
    fn parses_learner_output() {
        let text = "((segment_duration < 0.5) ((((0 0) (1 0)) 0)) ((((2 0.25) (3 inf)) nan)))";
        let tree = parse_tree(text, &schema()).unwrap();
        assert_eq!(tree.decision(0).unwrap().rule, Rule::LessThan(0.5));
        assert_eq!(leaf_units(&tree), vec![vec![0, 1], vec![2, 3]]);
    }

    #[test]
    fn parses_skeleton_with_empty_leaves() {
        let text = ";; skeleton\n((phone is a)\n  ((() 0))\n  ((pos isShortOf 3)\n    ((() 0)) ((() 0)) ((() 0))))\n";
        let tree = parse_tree(text, &schema()).unwrap();
        assert_eq!(tree.leaf_count(), 4);
        assert!(tree.check_leaf_chain());
        let inner = tree.decision(tree.decision(0).unwrap().children[1]).unwrap();
        assert_eq!(inner.rule, Rule::OneOf(vec![0, 1, 2]));
    }

    #[test]
    fn written_text_parses_to_same_tree() {
        let mut tree = Tree::new(NodeKind::decision(0, Rule::OneOf(vec![1, 3])));
        let a = tree.add_child(0, NodeKind::decision(2, Rule::LessThan(0.125)));
        tree.add_child(a, NodeKind::units(vec![4, 7]));
        tree.add_child(a, NodeKind::units(vec![]));
        tree.add_child(0, NodeKind::units(vec![1]));
        tree.add_child(0, NodeKind::units(vec![2, 3]));
        tree.relink_leaves();

        let s = schema();
        let text = to_text(&tree, &s).unwrap();
        assert!(text.contains("(phone in \"a\" \"say \\\"x\\\"\")"));
        assert!(text.contains("((() 0))"));
        let back = parse_tree(&text, &s).unwrap();
        assert_eq!(back, tree);
    }

    #[test]
    fn rejects_unknown_feature_and_value() {
        let s = schema();
        let err = parse_tree("((tone is a) ((() 0)) ((() 0)))", &s).unwrap_err();
        assert!(err.to_string().contains("unknown feature 'tone'"));
        let err = parse_tree("((phone is zz) ((() 0)) ((() 0)))", &s).unwrap_err();
        assert!(err.to_string().contains("'zz' is not a value"));
    }

    #[test]
    fn rejects_wrong_child_count() {
        let err = parse_tree("((phone is a) ((() 0)))", &schema()).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn rejects_bad_unit_index() {
        let err = parse_tree("((((x 0)) 0))", &schema()).unwrap_err();
        assert!(err.to_string().contains("unit index 'x'"));
    }

    #[test]
    fn single_leaf_tree() {
        let tree = parse_tree("((((5 0) (6 0)) 0))", &schema()).unwrap();
        assert_eq!(tree.leaf(0).unwrap().data, LeafData::Units(vec![5, 6]));
    }
}
