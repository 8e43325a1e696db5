//! Construction of the top-level tree, either by partitioning over a feature
//! sequence or by filling a hand-written skeleton.

mod partition;
mod sequence;
mod skeleton;

pub use partition::build_from_sequence;
pub use sequence::{
    parse_feature_sequence, read_feature_sequence, write_default_sequence, DEFAULT_SEQUENCE_FEATURE,
};
pub use skeleton::{fill_skeleton, FillReport};

use crate::codec;
use crate::config::{BuildConfig, BuildMode};
use crate::error::Result;
use crate::features::{FeatureSchema, FeatureVector};
use crate::tree::Tree;

/// The top-level tree and, in skeleton mode, how its units were placed.
#[derive(Debug)]
pub struct TopLevel {
    pub tree: Tree,
    pub mode: BuildMode,
    pub fill: Option<FillReport>,
}

/// Builds the top-level tree over `vectors`.
///
/// The configured mode is used when its input file exists; otherwise the
/// other mode's file is used when present. When neither exists a default
/// feature sequence is written and used.
pub fn build_top_level(config: &BuildConfig, schema: &FeatureSchema, vectors: Vec<FeatureVector>) -> Result<TopLevel> {
    let sequence_exists = config.feature_sequence_file.exists();
    let skeleton_exists = config.skeleton_file.exists();

    let mode = match (config.mode, sequence_exists, skeleton_exists) {
        (BuildMode::FeatureSequence, true, _) | (BuildMode::Skeleton, true, false) => {
            BuildMode::FeatureSequence
        }
        (BuildMode::Skeleton, _, true) | (BuildMode::FeatureSequence, false, true) => BuildMode::Skeleton,
        (_, false, false) => {
            tracing::warn!(
                path = %config.feature_sequence_file.display(),
                "no feature sequence or skeleton file, writing a default sequence on '{DEFAULT_SEQUENCE_FEATURE}'"
            );
            write_default_sequence(&config.feature_sequence_file)?;
            BuildMode::FeatureSequence
        }
    };
    if mode != config.mode {
        tracing::warn!(configured = ?config.mode, used = ?mode, "configured build input is missing");
    }

    match mode {
        BuildMode::FeatureSequence => {
            let sequence = read_feature_sequence(&config.feature_sequence_file, schema)?;
            let names: Vec<&str> = sequence.iter().map(|&f| schema.name(f)).collect();
            tracing::info!(sequence = ?names, units = vectors.len(), "building top-level tree from feature sequence");
            let tree = build_from_sequence(vectors, &sequence, schema);
            Ok(TopLevel { tree, mode, fill: None })
        }
        BuildMode::Skeleton => {
            tracing::info!(path = %config.skeleton_file.display(), units = vectors.len(), "filling skeleton tree");
            let skeleton = codec::read_text_file(&config.skeleton_file, schema)?;
            let (tree, report) = fill_skeleton(skeleton, vectors);
            Ok(TopLevel {
                tree,
                mode,
                fill: Some(report),
            })
        }
    }
}
