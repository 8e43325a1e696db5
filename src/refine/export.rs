//! Files handed to the learner: the shared field description and, per job,
//! the leaf's data rows and distance matrix.

use crate::distance::DistanceMatrix;
use crate::error::{IoContext, Result};
use crate::features::{FeatureSchema, FeatureVector, DURATION_FEATURE, LOGF0_FEATURE};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const DESCRIPTION_FILE: &str = "learner.desc";

/// Paths of one job's files inside the work directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFiles {
    pub job: usize,
    pub data: PathBuf,
    pub distances: PathBuf,
    pub tree: PathBuf,
}

impl JobFiles {
    pub fn new(work_dir: &Path, job: usize) -> Self {
        JobFiles {
            job,
            data: work_dir.join(format!("learner.data.{job}")),
            distances: work_dir.join(format!("learner.dist.{job}")),
            tree: work_dir.join(format!("learner.tree.{job}")),
        }
    }

    /// Deletes the data and distance files. The learner's tree is kept.
    pub fn remove_inputs(&self) {
        for path in [&self.data, &self.distances] {
            if let Err(e) = fs::remove_file(path) {
                tracing::debug!(job = self.job, path = %path.display(), "could not remove export file: {e}");
            }
        }
    }
}

/// Writes the field description once per refine run. The prosodic fields
/// feed the distance matrix only, so the learner is told to ignore them.
pub fn write_description(schema: &FeatureSchema, work_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(work_dir).at_path(work_dir)?;
    let path = work_dir.join(DESCRIPTION_FILE);
    let file = File::create(&path).at_path(&path)?;
    let mut w = BufWriter::new(file);
    schema.write_learner_description(&mut w, &[LOGF0_FEATURE, DURATION_FEATURE])?;
    w.flush().at_path(&path)?;
    Ok(path)
}

/// One line per vector: its position in `vectors`, then its feature values.
pub fn write_data_file(schema: &FeatureSchema, vectors: &[FeatureVector], path: &Path) -> Result<()> {
    let file = File::create(path).at_path(path)?;
    let mut w = BufWriter::new(file);
    for (local, fv) in vectors.iter().enumerate() {
        writeln!(w, "{local} {}", schema.feature_string(fv)).at_path(path)?;
    }
    w.flush().at_path(path)?;
    Ok(())
}

pub fn write_distance_file(matrix: &DistanceMatrix, path: &Path) -> Result<()> {
    let file = File::create(path).at_path(path)?;
    let mut w = BufWriter::new(file);
    matrix.write_to(&mut w)?;
    w.flush().at_path(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> FeatureSchema {
        FeatureSchema::builder()
            .byte("phone", &["0", "a", "e"])
            .float("unit_logf0")
            .float("unit_duration")
            .build()
            .unwrap()
    }

    #[test]
    fn data_rows_carry_local_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("learner.data.1");
        let vectors = vec![
            FeatureVector::new(40, vec![1], vec![], vec![5.0, 0.5]),
            FeatureVector::new(17, vec![2], vec![], vec![4.5, 0.25]),
        ];
        write_data_file(&schema(), &vectors, &path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "0 a 5 0.5\n1 e 4.5 0.25\n");
    }

    #[test]
    fn description_ignores_prosodic_fields() {
        let dir = tempfile::tempdir().unwrap();
        let work = dir.path().join("nested/work");
        let path = write_description(&schema(), &work).unwrap();
        let text = fs::read_to_string(path).unwrap();
        assert!(text.contains("( phone  \"0\"  \"a\"  \"e\" )"));
        assert!(text.contains("( unit_logf0 ignore float )"));
        assert!(text.contains("( unit_duration ignore float )"));
    }

    #[test]
    fn job_files_are_numbered_and_inputs_removable() {
        let dir = tempfile::tempdir().unwrap();
        let files = JobFiles::new(dir.path(), 3);
        assert!(files.tree.ends_with("learner.tree.3"));
        fs::write(&files.data, "x").unwrap();
        fs::write(&files.distances, "x").unwrap();
        fs::write(&files.tree, "x").unwrap();
        files.remove_inputs();
        assert!(!files.data.exists());
        assert!(!files.distances.exists());
        assert!(files.tree.exists());
    }
}
