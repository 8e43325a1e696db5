//! The whole build: load, build the top-level tree, rebalance, refine, and
//! persist.
//!
//! The final tree is written next to its destination under a `.tmp` name and
//! renamed only once it is complete, so a failed run never leaves a file that
//! could pass for a finished tree.

use crate::build::build_top_level;
use crate::codec;
use crate::config::BuildConfig;
use crate::distance::CoefficientFile;
use crate::error::{IoContext, Result};
use crate::features::FeatureStore;
use crate::rebalance::rebalance;
use crate::refine::{LeafRefiner, RefineStats};
use crate::report::{leaf_rows, write_leaf_report, write_summary, RunSummary};
use crate::timing::{cpu_time, timed, PhaseTimings};
use crate::tree::Tree;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Logs a failed phase before handing the error up.
fn phase<T>(name: &'static str, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        tracing::error!(phase = name, "build failed: {e}");
    }
    result
}

/// Runs a complete build as described by `config`.
pub fn run(config: &BuildConfig) -> Result<RunSummary> {
    config.validate()?;
    let start = Instant::now();
    let cpu_start = cpu_time();
    let mut timings = PhaseTimings::default();

    let mut store = phase(
        "load",
        timed(&mut timings.load, || FeatureStore::load(&config.feature_file)),
    )?;
    let edge_units_removed = store.remove_edge_vectors();
    tracing::info!(
        units = store.vectors.len(),
        edge_units_removed,
        path = %config.feature_file.display(),
        "loaded unit features"
    );
    let FeatureStore { schema, vectors } = store;

    let top = phase(
        "build",
        timed(&mut timings.build, || build_top_level(config, &schema, vectors)),
    )?;
    let mut tree = top.tree;
    tracing::info!(leaves = tree.leaf_count(), height = tree.height(), "top-level tree built");

    let report = timed(&mut timings.rebalance, || {
        rebalance(&mut tree, &schema, config.min_leaf_size, config.max_leaf_size)
    });
    let rows = leaf_rows(&tree, &schema, &report);

    let refine = if config.call_learner {
        let stats = phase(
            "refine",
            timed(&mut timings.refine, || -> Result<RefineStats> {
                let coefficients = CoefficientFile::open(&config.coefficient_file)?;
                LeafRefiner::new(config, &schema, &coefficients).refine(&mut tree)
            }),
        )?;
        Some(stats)
    } else {
        tracing::info!("learner disabled, keeping top-level leaves");
        None
    };

    tree.finalize_leaves();
    phase(
        "persist",
        timed(&mut timings.persist, || -> Result<()> {
            write_tree_atomically(&tree, &config.tree_name, &config.output_file)?;
            if let Some(path) = &config.text_dump {
                codec::write_text_file(&tree, &schema, path)?;
            }
            if let Some(path) = &config.leaf_report {
                write_leaf_report(&rows, path)?;
            }
            Ok(())
        }),
    )?;

    timings.cpu = cpu_time().saturating_sub(cpu_start);
    let summary = RunSummary {
        mode: top.mode,
        edge_units_removed,
        fill: top.fill,
        rebalance: report,
        refine,
        leaves: tree.leaf_count(),
        nodes: tree.len(),
        height: tree.height(),
        timings,
        output_file: config.output_file.clone(),
    };
    if let Some(path) = &config.summary_file {
        phase("persist", write_summary(&summary, path))?;
    }

    tracing::info!(
        leaves = summary.leaves,
        nodes = summary.nodes,
        path = %config.output_file.display(),
        "processing took {} ms",
        start.elapsed().as_millis()
    );
    Ok(summary)
}

/// `<path>.tmp`, in the same directory as `path`.
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Writes the binary tree to a temporary sibling of `path` and renames it
/// into place. The temporary file is removed if writing fails.
pub fn write_tree_atomically(tree: &Tree, name: &str, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).at_path(dir)?;
    }
    let tmp = temp_path(path);
    if let Err(e) = codec::dump_file(tree, name, &tmp) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    fs::rename(&tmp, path).at_path(path)?;
    tracing::debug!(path = %path.display(), nodes = tree.len(), "tree written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::NodeKind;

    #[test]
    fn temp_path_appends_suffix() {
        assert_eq!(temp_path(Path::new("mary/cart.mry")), PathBuf::from("mary/cart.mry.tmp"));
    }

    #[test]
    fn atomic_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/cart.mry");
        let tree = Tree::new(NodeKind::units(vec![1, 2, 3]));
        write_tree_atomically(&tree, "cart", &path).unwrap();
        assert!(path.exists());
        assert!(!temp_path(&path).exists());
    }
}
