//! Feature-sequence file: one feature name per line, `#` comments.

use crate::error::{Error, IoContext, Result};
use crate::features::FeatureSchema;
use std::fs;
use std::path::Path;

/// Feature used when a default sequence file has to be generated.
pub const DEFAULT_SEQUENCE_FEATURE: &str = "phone";

const DEFAULT_SEQUENCE_HEADER: &str = "\
# Features used to partition the units of the top-level tree,
# one per line, from the root downwards.
# Only byte and short features can be listed.
";

pub fn parse_feature_sequence(text: &str, schema: &FeatureSchema) -> Result<Vec<usize>> {
    let mut sequence = Vec::new();
    for (n, line) in text.lines().enumerate() {
        let name = line.trim();
        if name.is_empty() || name.starts_with('#') {
            continue;
        }
        let idx = schema.feature_index(name).ok_or_else(|| {
            Error::Config(format!("feature sequence line {}: unknown feature '{name}'", n + 1))
        })?;
        if !schema.kind(idx).is_enum() {
            return Err(Error::Config(format!(
                "feature sequence line {}: '{name}' is a float feature and cannot partition units",
                n + 1
            )));
        }
        sequence.push(idx);
    }
    Ok(sequence)
}

pub fn read_feature_sequence(path: &Path, schema: &FeatureSchema) -> Result<Vec<usize>> {
    let text = fs::read_to_string(path).at_path(path)?;
    parse_feature_sequence(&text, schema)
}

/// Writes a sequence file that partitions on the default feature only.
pub fn write_default_sequence(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).at_path(dir)?;
    }
    let text = format!("{DEFAULT_SEQUENCE_HEADER}{DEFAULT_SEQUENCE_FEATURE}\n");
    fs::write(path, text).at_path(path)?;
    Ok(())
}
