//! Build configuration.
//!
//! Every path and tuning value of a build lives in [`BuildConfig`], loaded from
//! a TOML file and handed to each phase explicitly.

use crate::error::{Error, IoContext, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

// --- Defaults ---
pub const DEFAULT_MIN_LEAF_SIZE: usize = 5;
pub const DEFAULT_MAX_LEAF_SIZE: usize = 10_000_000;
pub const DEFAULT_MIN_SPLIT_SIZE: usize = 50;
pub const DEFAULT_LEARNER: &str = "wagon";

/// How the top-level tree is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildMode {
    /// Recursive partition over the features listed in the sequence file.
    FeatureSequence,
    /// Fill a skeleton tree read from its text file.
    Skeleton,
}

/// Time alignment used by the spectral distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentStrategy {
    /// Linear index stretching of the shorter sequence.
    #[default]
    Stretch,
    /// Dynamic time warping with a symmetric slope constraint.
    Dtw,
}

impl fmt::Display for AlignmentStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlignmentStrategy::Stretch => write!(f, "stretch"),
            AlignmentStrategy::Dtw => write!(f, "dtw"),
        }
    }
}

/// External learner invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnerConfig {
    /// Executable to run.
    pub program: PathBuf,
    /// Arguments placed before the standard ones.
    pub leading_args: Vec<String>,
    /// Value passed as `-balance`.
    pub balance: u32,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        LearnerConfig {
            program: PathBuf::from(DEFAULT_LEARNER),
            leading_args: Vec::new(),
            balance: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub feature_file: PathBuf,
    pub feature_sequence_file: PathBuf,
    pub skeleton_file: PathBuf,
    pub mode: BuildMode,
    pub output_file: PathBuf,
    pub coefficient_file: PathBuf,
    /// Directory receiving the learner's input and output files.
    pub work_dir: PathBuf,
    /// Name stored in the binary tree file.
    pub tree_name: String,
    /// Maximum number of learner processes running at once.
    pub parallelism: usize,
    pub min_leaf_size: usize,
    pub max_leaf_size: usize,
    /// Leaves with at most this many units are not refined.
    pub min_split_size: usize,
    pub call_learner: bool,
    pub learner: LearnerConfig,
    pub retain_intermediate_files: bool,
    pub alignment: AlignmentStrategy,
    pub leaf_report: Option<PathBuf>,
    pub summary_file: Option<PathBuf>,
    pub text_dump: Option<PathBuf>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        BuildConfig {
            feature_file: PathBuf::from("mary/halfphoneFeatures_ac.mry"),
            feature_sequence_file: PathBuf::from("config/featureSequence.txt"),
            skeleton_file: PathBuf::from("config/topLevel.tree"),
            mode: BuildMode::FeatureSequence,
            output_file: PathBuf::from("mary/cart.mry"),
            coefficient_file: PathBuf::from("mary/coefficients.mry"),
            work_dir: PathBuf::from("temp/learner"),
            tree_name: String::new(),
            parallelism: 1,
            min_leaf_size: DEFAULT_MIN_LEAF_SIZE,
            max_leaf_size: DEFAULT_MAX_LEAF_SIZE,
            min_split_size: DEFAULT_MIN_SPLIT_SIZE,
            call_learner: false,
            learner: LearnerConfig::default(),
            retain_intermediate_files: false,
            alignment: AlignmentStrategy::Stretch,
            leaf_report: None,
            summary_file: None,
            text_dump: None,
        }
    }
}

impl BuildConfig {
    /// Loads a TOML configuration file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).at_path(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: BuildConfig =
            toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_leaf_size == 0 {
            return Err(Error::Config("max_leaf_size must be positive".into()));
        }
        if self.min_leaf_size > self.max_leaf_size {
            return Err(Error::Config(format!(
                "min_leaf_size {} exceeds max_leaf_size {}",
                self.min_leaf_size, self.max_leaf_size
            )));
        }
        Ok(())
    }

    /// Worker count, never below one.
    pub fn effective_parallelism(&self) -> usize {
        self.parallelism.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = BuildConfig::from_toml("").unwrap();
        assert_eq!(config, BuildConfig::default());
        assert_eq!(config.min_leaf_size, 5);
        assert_eq!(config.min_split_size, 50);
        assert_eq!(config.alignment, AlignmentStrategy::Stretch);
    }

    #[test]
    fn keys_override_defaults() {
        let text = r#"
            mode = "skeleton"
            parallelism = 4
            call_learner = true
            alignment = "dtw"

            [learner]
            program = "/opt/speech_tools/bin/wagon"
        "#;
        let config = BuildConfig::from_toml(text).unwrap();
        assert_eq!(config.mode, BuildMode::Skeleton);
        assert_eq!(config.parallelism, 4);
        assert_eq!(config.alignment, AlignmentStrategy::Dtw);
        assert_eq!(config.learner.program, PathBuf::from("/opt/speech_tools/bin/wagon"));
        assert_eq!(config.learner.balance, 0);
    }

    #[test]
    fn inverted_leaf_bounds_are_rejected() {
        let err = BuildConfig::from_toml("min_leaf_size = 20\nmax_leaf_size = 10").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn zero_parallelism_is_clamped() {
        let config = BuildConfig {
            parallelism: 0,
            ..BuildConfig::default()
        };
        assert_eq!(config.effective_parallelism(), 1);
    }
}
