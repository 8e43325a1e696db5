//! Tree persistence: the binary tree file read by the synthesizer and the text
//! notation exchanged with the learner and used for skeletons.

mod binary;
mod sexpr;
mod text;

pub use binary::{dump, load, LoadedTree};
pub use text::{parse_tree, to_text, write_tree};

use crate::error::{IoContext, Result};
use crate::features::FeatureSchema;
use crate::tree::{Rule, Tree};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Checks a decision against the schema: the feature exists, its kind suits
/// the rule, enum values are declared, and the child count fits the rule.
pub(crate) fn check_decision(
    schema: &FeatureSchema,
    feature: usize,
    rule: &Rule,
    children: usize,
) -> std::result::Result<(), String> {
    if feature >= schema.len() {
        return Err(format!(
            "feature index {feature} outside schema of {} features",
            schema.len()
        ));
    }
    let name = schema.name(feature);
    let is_enum = schema.kind(feature).is_enum();
    let check_value = |v: u16| {
        if (v as usize) < schema.num_values(feature) {
            Ok(())
        } else {
            Err(format!("value {v} not declared for feature '{name}'"))
        }
    };
    match rule {
        Rule::Equals(v) => {
            if !is_enum {
                return Err(format!("equality test on float feature '{name}'"));
            }
            check_value(*v)?;
            if children != 2 {
                return Err(format!("equality test on '{name}' needs 2 children, found {children}"));
            }
        }
        Rule::LessThan(_) => {
            if is_enum {
                return Err(format!("threshold test on enum feature '{name}'"));
            }
            if children != 2 {
                return Err(format!("threshold test on '{name}' needs 2 children, found {children}"));
            }
        }
        Rule::OneOf(values) => {
            if !is_enum {
                return Err(format!("multi-way split on float feature '{name}'"));
            }
            if values.is_empty() {
                return Err(format!("multi-way split on '{name}' lists no values"));
            }
            values.iter().try_for_each(|v| check_value(*v))?;
            let k = values.len();
            if children != k && children != k + 1 {
                return Err(format!(
                    "multi-way split on '{name}' with {k} values needs {k} or {} children, found {children}",
                    k + 1
                ));
            }
        }
    }
    Ok(())
}

/// Writes the binary tree to `path`.
pub fn dump_file(tree: &Tree, name: &str, path: &Path) -> Result<()> {
    let file = File::create(path).at_path(path)?;
    let mut w = BufWriter::new(file);
    dump(tree, name, &mut w)?;
    w.flush().at_path(path)?;
    Ok(())
}

pub fn load_file(path: &Path, schema: &FeatureSchema) -> Result<LoadedTree> {
    let file = File::open(path).at_path(path)?;
    let mut r = BufReader::new(file);
    load(&mut r, schema, &path.display().to_string())
}

/// Reads and parses a text tree file.
pub fn read_text_file(path: &Path, schema: &FeatureSchema) -> Result<Tree> {
    let text = fs::read_to_string(path).at_path(path)?;
    parse_tree(&text, schema)
}

pub fn write_text_file(tree: &Tree, schema: &FeatureSchema, path: &Path) -> Result<()> {
    let file = File::create(path).at_path(path)?;
    let mut w = BufWriter::new(file);
    write_tree(tree, schema, &mut w)?;
    w.flush().at_path(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> FeatureSchema {
        FeatureSchema::builder()
            .byte("phone", &["0", "a"])
            .float("f0")
            .build()
            .unwrap()
    }

    #[test]
    fn decision_checks() {
        let s = schema();
        assert!(check_decision(&s, 0, &Rule::Equals(1), 2).is_ok());
        assert!(check_decision(&s, 0, &Rule::Equals(2), 2).is_err());
        assert!(check_decision(&s, 1, &Rule::Equals(0), 2).is_err());
        assert!(check_decision(&s, 0, &Rule::LessThan(0.5), 2).is_err());
        assert!(check_decision(&s, 1, &Rule::LessThan(0.5), 3).is_err());
        assert!(check_decision(&s, 0, &Rule::OneOf(vec![0, 1]), 3).is_ok());
        assert!(check_decision(&s, 0, &Rule::OneOf(vec![0, 1]), 4).is_err());
        assert!(check_decision(&s, 2, &Rule::LessThan(0.5), 2).is_err());
    }
}
