//! Bounded pool of learner jobs.
//!
//! The dispatcher thread owns the tree. It exports one leaf at a time, hands
//! the job to a worker thread, and blocks on the result channel whenever
//! every slot is busy. Results are spliced on the dispatcher thread in
//! completion order; each splice only touches the leaf it replaces.

use super::export::{write_data_file, write_distance_file, JobFiles};
use super::learner::Learner;
use super::Progress;
use crate::codec;
use crate::distance::{CoefficientSource, DistanceEngine};
use crate::error::{Error, Result};
use crate::features::{FeatureSchema, FeatureVector};
use crate::tree::{LeafData, NodeId, Tree};
use crossbeam_channel::{bounded, Receiver, Sender};
use serde::Serialize;
use std::thread;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RefineStats {
    /// Leaves replaced by a learned subtree.
    pub refined: usize,
    /// Leaves at or below the split threshold.
    pub skipped: usize,
    pub nodes_before: usize,
    pub nodes_after: usize,
}

/// What a finished worker sends back.
struct JobOutcome {
    job: usize,
    leaf: NodeId,
    result: Result<Tree>,
}

pub(crate) struct Pool<'a, S: CoefficientSource + ?Sized> {
    pub schema: &'a FeatureSchema,
    pub engine: &'a DistanceEngine<'a, S>,
    pub learner: &'a Learner<'a>,
    pub work_dir: &'a std::path::Path,
    pub parallelism: usize,
    pub retain_files: bool,
    pub progress: &'a Progress,
}

impl<S: CoefficientSource + ?Sized> Pool<'_, S> {
    /// Refines `targets` in order. The first failure stops dispatch; jobs
    /// already running are waited for, their successes still spliced, before
    /// the failure is returned.
    pub fn run(&self, tree: &mut Tree, targets: &[NodeId], stats: &mut RefineStats) -> Result<()> {
        let slots = self.parallelism.max(1);
        let total = targets.len();
        let (tx, rx): (Sender<JobOutcome>, Receiver<JobOutcome>) = bounded(slots);
        let mut first_error: Option<Error> = None;

        thread::scope(|scope| {
            let mut active = 0usize;
            for (n, &leaf) in targets.iter().enumerate() {
                if active == slots {
                    if let Ok(outcome) = rx.recv() {
                        active -= 1;
                        self.collect(tree, outcome, stats, &mut first_error);
                    }
                }
                if first_error.is_some() {
                    break;
                }

                let job = n + 1;
                let vectors = match tree.leaf(leaf).map(|l| &l.data) {
                    Some(LeafData::Vectors(v)) => v.clone(),
                    _ => {
                        first_error = Some(Error::Config(format!("leaf {leaf} holds no feature vectors to refine")));
                        break;
                    }
                };
                let files = JobFiles::new(self.work_dir, job);
                if let Err(e) = self.export(&files, &vectors) {
                    tracing::error!(job, leaf, units = vectors.len(), "export failed: {e}");
                    if !self.retain_files {
                        files.remove_inputs();
                    }
                    first_error = Some(e);
                    break;
                }

                tracing::debug!(job, leaf, units = vectors.len(), "dispatching learner job");
                let tx = tx.clone();
                let schema = self.schema;
                let learner = self.learner;
                let retain = self.retain_files;
                scope.spawn(move || {
                    let result = run_job(learner, schema, &files, &vectors);
                    if !retain {
                        files.remove_inputs();
                    }
                    let _ = tx.send(JobOutcome { job, leaf, result });
                });
                active += 1;
                self.progress.set((100 * n / total.max(1)) as i32);
            }

            drop(tx);
            while active > 0 {
                match rx.recv() {
                    Ok(outcome) => {
                        active -= 1;
                        self.collect(tree, outcome, stats, &mut first_error);
                    }
                    Err(_) => break,
                }
            }
        });

        match first_error {
            Some(e) => Err(e),
            None => {
                self.progress.set(100);
                Ok(())
            }
        }
    }

    fn export(&self, files: &JobFiles, vectors: &[FeatureVector]) -> Result<()> {
        write_data_file(self.schema, vectors, &files.data)?;
        let matrix = self.engine.compute_matrix(vectors)?;
        write_distance_file(&matrix, &files.distances)
    }

    fn collect(&self, tree: &mut Tree, outcome: JobOutcome, stats: &mut RefineStats, first_error: &mut Option<Error>) {
        let JobOutcome { job, leaf, result } = outcome;
        match result {
            Ok(subtree) => {
                tracing::debug!(job, leaf, leaves = subtree.leaf_count(), "splicing learned subtree");
                tree.splice_leaf(leaf, subtree);
                stats.refined += 1;
            }
            Err(e) => {
                tracing::error!(job, leaf, "learner job failed: {e}");
                if first_error.is_none() {
                    *first_error = Some(e);
                }
            }
        }
    }
}

/// Runs the learner and reads its tree back with unit vectors in place of
/// the local indices it was given.
fn run_job(learner: &Learner<'_>, schema: &FeatureSchema, files: &JobFiles, vectors: &[FeatureVector]) -> Result<Tree> {
    learner.run(files)?;
    let subtree = codec::read_text_file(&files.tree, schema)?;
    remap_leaves(subtree, vectors, files.job)
}

/// Replaces local indices by the vectors at those positions.
pub(crate) fn remap_leaves(mut subtree: Tree, vectors: &[FeatureVector], job: usize) -> Result<Tree> {
    let leaves: Vec<NodeId> = subtree.leaves().collect();
    for id in leaves {
        let Some(leaf) = subtree.leaf_mut(id) else {
            continue;
        };
        let mapped = leaf
            .data
            .unit_indices()
            .into_iter()
            .map(|local| {
                vectors.get(local as usize).cloned().ok_or_else(|| {
                    Error::parse(
                        0,
                        format!("learner tree of job {job} names index {local}, leaf holds {}", vectors.len()),
                    )
                })
            })
            .collect::<Result<Vec<_>>>()?;
        leaf.data = LeafData::Vectors(mapped);
    }
    Ok(subtree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{NodeKind, Rule};

    fn vectors() -> Vec<FeatureVector> {
        [30u32, 31, 32]
            .iter()
            .map(|&u| FeatureVector::new(u, vec![1], vec![], vec![]))
            .collect()
    }

    #[test]
    fn local_indices_map_to_units() {
        let mut t = Tree::new(NodeKind::decision(0, Rule::Equals(1)));
        t.add_child(0, NodeKind::units(vec![2, 0]));
        t.add_child(0, NodeKind::units(vec![1]));
        t.relink_leaves();
        let t = remap_leaves(t, &vectors(), 1).unwrap();
        let units: Vec<Vec<u32>> = t.leaves().map(|id| t.leaf(id).unwrap().data.unit_indices()).collect();
        assert_eq!(units, [vec![32, 30], vec![31]]);
        assert!(matches!(t.leaf(1).unwrap().data, LeafData::Vectors(_)));
    }

    #[test]
    fn out_of_range_index_is_parse_error() {
        let t = Tree::new(NodeKind::units(vec![0, 3]));
        let err = remap_leaves(t, &vectors(), 5).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
        assert!(err.to_string().contains("job 5"));
    }
}
