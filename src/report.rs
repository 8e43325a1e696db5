//! Build reports: the per-leaf CSV listing and the JSON run summary.

use crate::build::FillReport;
use crate::config::BuildMode;
use crate::error::{IoContext, Result};
use crate::features::FeatureSchema;
use crate::rebalance::{LeafStatus, RebalanceReport};
use crate::refine::RefineStats;
use crate::timing::PhaseTimings;
use crate::tree::{NodeId, Tree};
use csv::WriterBuilder;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// One row of the leaf report.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafRow {
    pub leaf: NodeId,
    pub decision_path: String,
    pub population: usize,
    pub status: LeafStatus,
}

/// Rows for every leaf in chain order. Leaves the rebalancer never saw are
/// reported as `ok`.
pub fn leaf_rows(tree: &Tree, schema: &FeatureSchema, rebalance: &RebalanceReport) -> Vec<LeafRow> {
    tree.leaves()
        .map(|id| LeafRow {
            leaf: id,
            decision_path: tree.decision_path(id, schema),
            population: tree.leaf(id).map_or(0, |l| l.data.len()),
            status: rebalance.status_of(id).unwrap_or(LeafStatus::Ok),
        })
        .collect()
}

/// Writes the header row and one row per leaf.
pub fn write_leaf_report(rows: &[LeafRow], path: &Path) -> Result<()> {
    let file = File::create(path).at_path(path)?;
    let mut wtr = WriterBuilder::new().from_writer(file);
    wtr.write_record(["leaf", "decision_path", "population", "status"])?;
    for row in rows {
        wtr.write_record([
            row.leaf.to_string(),
            row.decision_path.clone(),
            row.population.to_string(),
            row.status.as_str().to_string(),
        ])?;
    }
    wtr.flush().at_path(path)?;
    Ok(())
}

/// Everything a finished build reports about itself.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub mode: BuildMode,
    /// Units removed as boundary units before building.
    pub edge_units_removed: usize,
    pub fill: Option<FillReport>,
    pub rebalance: RebalanceReport,
    pub refine: Option<RefineStats>,
    pub leaves: usize,
    pub nodes: usize,
    pub height: usize,
    pub timings: PhaseTimings,
    pub output_file: PathBuf,
}

pub fn write_summary(summary: &RunSummary, path: &Path) -> Result<()> {
    let file = File::create(path).at_path(path)?;
    let mut w = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut w, summary)?;
    writeln!(w).at_path(path)?;
    w.flush().at_path(path)?;
    Ok(())
}
