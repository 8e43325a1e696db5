//! Builds the unit-selection classification tree of a concatenative TTS voice.
//!
//! Units are first split by a top-level tree, built either by partitioning
//! over a feature sequence or by filling a hand-written skeleton. Leaves are
//! then size-checked and, when enabled, each large leaf is clustered by an
//! external learner on acoustic distances and replaced by the learned
//! subtree. The result is written as a binary tree file.

pub mod build;
pub mod codec;
pub mod config;
pub mod distance;
pub mod error;
pub mod features;
pub mod header;
pub mod logging;
pub mod pipeline;
pub mod rebalance;
pub mod refine;
pub mod report;
pub mod timing;
pub mod tree;

pub use config::BuildConfig;
pub use error::{Error, Result};
pub use tree::{NodeId, Tree};
