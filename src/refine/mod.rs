//! Leaf refinement: every sufficiently large leaf of the top-level tree is
//! exported, clustered by the external learner, and replaced by the subtree
//! the learner returns.

mod export;
mod learner;
mod pool;

pub use export::{write_data_file, write_description, write_distance_file, JobFiles, DESCRIPTION_FILE};
pub use learner::Learner;
pub use pool::RefineStats;

use crate::config::BuildConfig;
use crate::distance::{CoefficientSource, DistanceEngine};
use crate::error::Result;
use crate::features::FeatureSchema;
use crate::tree::{NodeId, Tree};
use pool::Pool;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

/// Share of refinement dispatched so far, 0 to 100, or -1 before a run
/// starts. Clones observe the same value.
#[derive(Debug, Clone)]
pub struct Progress(Arc<AtomicI32>);

impl Default for Progress {
    fn default() -> Self {
        Progress(Arc::new(AtomicI32::new(-1)))
    }
}

impl Progress {
    pub fn get(&self) -> i32 {
        self.0.load(Ordering::Relaxed)
    }

    fn set(&self, value: i32) {
        self.0.store(value, Ordering::Relaxed);
    }
}

pub struct LeafRefiner<'a, S: CoefficientSource + ?Sized> {
    config: &'a BuildConfig,
    schema: &'a FeatureSchema,
    engine: DistanceEngine<'a, S>,
    progress: Progress,
}

impl<'a, S: CoefficientSource + ?Sized> LeafRefiner<'a, S> {
    pub fn new(config: &'a BuildConfig, schema: &'a FeatureSchema, source: &'a S) -> Self {
        LeafRefiner {
            config,
            schema,
            engine: DistanceEngine::new(source, schema, config.alignment),
            progress: Progress::default(),
        }
    }

    /// Handle for polling progress from another thread.
    pub fn progress(&self) -> Progress {
        self.progress.clone()
    }

    /// Refines every leaf holding more than `min_split_size` vectors.
    ///
    /// Fails on the first export, learner or parse failure, after the jobs
    /// still running have finished. Subtrees that were already spliced stay
    /// in `tree`.
    pub fn refine(&self, tree: &mut Tree) -> Result<RefineStats> {
        let threshold = self.config.min_split_size;
        let mut stats = RefineStats {
            nodes_before: tree.len(),
            ..RefineStats::default()
        };
        let (targets, skipped): (Vec<NodeId>, Vec<NodeId>) = tree
            .leaves()
            .partition(|&id| tree.leaf(id).is_some_and(|l| l.data.len() > threshold));
        stats.skipped = skipped.len();
        self.progress.set(0);

        tracing::info!(
            leaves = targets.len(),
            skipped = stats.skipped,
            parallelism = self.config.effective_parallelism(),
            alignment = %self.engine.alignment(),
            "refining leaves"
        );

        let work_dir = self.config.work_dir.as_path();
        let description = write_description(self.schema, work_dir)?;
        let learner = Learner::new(&self.config.learner, &description, threshold);
        let pool = Pool {
            schema: self.schema,
            engine: &self.engine,
            learner: &learner,
            work_dir,
            parallelism: self.config.effective_parallelism(),
            retain_files: self.config.retain_intermediate_files,
            progress: &self.progress,
        };
        pool.run(tree, &targets, &mut stats)?;

        stats.nodes_after = tree.len();
        tracing::info!(
            refined = stats.refined,
            nodes_before = stats.nodes_before,
            nodes_after = stats.nodes_after,
            "refinement finished"
        );
        Ok(stats)
    }
}
