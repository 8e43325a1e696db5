//! Pairwise acoustic distances between the units of a leaf.
//!
//! The distance of two units combines a spectral term, the average
//! Mahalanobis distance of their coefficient frames under a time alignment,
//! with weighted absolute differences of their mean log F0 and duration. The
//! Mahalanobis variances are pooled over every frame of the leaf.

mod align;
mod coefficients;

pub use align::{dtw_distance, frame_variance, mahalanobis, stretch_distance};
pub use coefficients::{CoefficientFile, CoefficientSource, Frames, InMemoryCoefficients};

use crate::config::AlignmentStrategy;
use crate::error::Result;
use crate::features::{FeatureSchema, FeatureVector, DURATION_FEATURE, LOGF0_FEATURE};
use std::io::Write;

#[cfg(not(feature = "non-parallel"))]
use rayon::prelude::*;

/// Distance of a unit with no frames to a unit with frames, and the value
/// substituted for non-finite frame distances.
pub const ZERO_FRAME_PENALTY: f64 = 100_000.0;
pub const F0_WEIGHT: f64 = 100.0;
pub const DURATION_WEIGHT: f64 = 1000.0;

/// Square symmetric matrix with a zero diagonal, stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMatrix {
    size: usize,
    values: Vec<f32>,
}

impl DistanceMatrix {
    pub fn zeros(size: usize) -> Self {
        DistanceMatrix {
            size,
            values: vec![0.0; size * size],
        }
    }

    #[inline(always)]
    pub fn size(&self) -> usize {
        self.size
    }

    /// # Panics
    /// Panics if `i` or `j` is out of bounds.
    #[inline(always)]
    pub fn get(&self, i: usize, j: usize) -> f32 {
        self.values[i * self.size + j]
    }

    /// Sets both `(i, j)` and `(j, i)`.
    #[inline(always)]
    fn set_pair(&mut self, i: usize, j: usize, v: f32) {
        self.values[i * self.size + j] = v;
        self.values[j * self.size + i] = v;
    }

    pub fn row(&self, i: usize) -> &[f32] {
        &self.values[i * self.size..(i + 1) * self.size]
    }

    /// Writes one line per row, each value followed by a space.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        for i in 0..self.size {
            for v in self.row(i) {
                write!(w, "{v} ")?;
            }
            writeln!(w)?;
        }
        Ok(())
    }
}

/// Computes leaf distance matrices from a coefficient source.
pub struct DistanceEngine<'a, S: CoefficientSource + ?Sized> {
    source: &'a S,
    alignment: AlignmentStrategy,
    logf0: Option<usize>,
    duration: Option<usize>,
}

impl<'a, S: CoefficientSource + ?Sized> DistanceEngine<'a, S> {
    /// The F0 and duration terms are left out when the schema has no float
    /// feature of the corresponding name.
    pub fn new(source: &'a S, schema: &FeatureSchema, alignment: AlignmentStrategy) -> Self {
        let float_feature = |name: &str| {
            schema
                .feature_index(name)
                .filter(|&idx| !schema.kind(idx).is_enum())
        };
        let logf0 = float_feature(LOGF0_FEATURE);
        let duration = float_feature(DURATION_FEATURE);
        if logf0.is_none() || duration.is_none() {
            tracing::debug!(
                logf0 = logf0.is_some(),
                duration = duration.is_some(),
                "prosodic distance terms unavailable in schema"
            );
        }
        DistanceEngine {
            source,
            alignment,
            logf0,
            duration,
        }
    }

    pub fn alignment(&self) -> AlignmentStrategy {
        self.alignment
    }

    /// Distance matrix over `vectors`, in their order.
    ///
    /// Fails with a data error when a unit's frames cannot be read.
    pub fn compute_matrix(&self, vectors: &[FeatureVector]) -> Result<DistanceMatrix> {
        let frames = vectors
            .iter()
            .map(|fv| self.source.frames(fv.unit_index()))
            .collect::<Result<Vec<Frames>>>()?;
        let sigma2 = frame_variance(&frames, self.source.dimension());
        let n = vectors.len();
        let terms = PairTerms {
            alignment: self.alignment,
            logf0: self.logf0,
            duration: self.duration,
        };

        let upper_row = |i: usize| -> Vec<f32> {
            ((i + 1)..n)
                .map(|j| terms.distance(&vectors[i], &vectors[j], &frames[i], &frames[j], &sigma2) as f32)
                .collect()
        };

        #[cfg(feature = "non-parallel")]
        let rows: Vec<Vec<f32>> = (0..n).map(upper_row).collect();
        #[cfg(not(feature = "non-parallel"))]
        let rows: Vec<Vec<f32>> = (0..n).into_par_iter().map(upper_row).collect();

        let mut matrix = DistanceMatrix::zeros(n);
        for (i, row) in rows.into_iter().enumerate() {
            for (offset, v) in row.into_iter().enumerate() {
                matrix.set_pair(i, i + 1 + offset, v);
            }
        }
        Ok(matrix)
    }
}

/// What goes into a pair distance; copied out of the engine so rows can be
/// computed on worker threads without sharing the coefficient source.
#[derive(Clone, Copy)]
struct PairTerms {
    alignment: AlignmentStrategy,
    logf0: Option<usize>,
    duration: Option<usize>,
}

impl PairTerms {
    fn distance(&self, a: &FeatureVector, b: &FeatureVector, fa: &Frames, fb: &Frames, sigma2: &[f64]) -> f64 {
        if fa.is_empty() || fb.is_empty() {
            return if fa.len() == fb.len() { 0.0 } else { ZERO_FRAME_PENALTY };
        }
        let spectral = match self.alignment {
            AlignmentStrategy::Stretch => stretch_distance(fa, fb, sigma2),
            AlignmentStrategy::Dtw => dtw_distance(fa, fb, sigma2),
        };
        let scalar = |idx: Option<usize>| {
            idx.map_or(0.0, |i| (a.float_value(i) as f64 - b.float_value(i) as f64).abs())
        };
        spectral + F0_WEIGHT * scalar(self.logf0) + DURATION_WEIGHT * scalar(self.duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn schema() -> FeatureSchema {
        FeatureSchema::builder()
            .byte("phone", &["0", "a"])
            .float("unit_logf0")
            .float("unit_duration")
            .build()
            .unwrap()
    }

    fn fv(unit: u32, logf0: f32, dur: f32) -> FeatureVector {
        FeatureVector::new(unit, vec![1], vec![], vec![logf0, dur])
    }

    #[test]
    fn zero_frame_unit_against_voiced_unit_gets_penalty() {
        let mut source = InMemoryCoefficients::new(2, 16000);
        source.insert(0, &[]);
        source.insert(1, &[vec![0.1, 0.2], vec![0.3, 0.1], vec![0.2, 0.2]]);
        let engine = DistanceEngine::new(&source, &schema(), AlignmentStrategy::Stretch);
        let m = engine.compute_matrix(&[fv(0, 5.0, 0.1), fv(1, 5.5, 0.2)]).unwrap();
        assert_eq!(m.get(0, 1), 100000.0);
        assert_eq!(m.get(1, 0), 100000.0);
        assert_eq!(m.get(0, 0), 0.0);
    }

    #[test]
    fn two_empty_units_are_at_distance_zero() {
        let mut source = InMemoryCoefficients::new(2, 16000);
        source.insert(0, &[]);
        source.insert(1, &[]);
        let engine = DistanceEngine::new(&source, &schema(), AlignmentStrategy::Stretch);
        let m = engine.compute_matrix(&[fv(0, 5.0, 0.1), fv(1, 6.0, 0.3)]).unwrap();
        assert_eq!(m.get(0, 1), 0.0);
    }

    #[test]
    fn prosodic_terms_are_weighted() {
        let mut source = InMemoryCoefficients::new(1, 16000);
        source.insert(0, &[vec![1.0], vec![3.0]]);
        source.insert(1, &[vec![1.0], vec![3.0]]);
        let engine = DistanceEngine::new(&source, &schema(), AlignmentStrategy::Stretch);
        let m = engine.compute_matrix(&[fv(0, 5.0, 0.25), fv(1, 5.5, 0.5)]).unwrap();
        // identical frames: 100 * 0.5 + 1000 * 0.25
        assert!((m.get(0, 1) - 300.0).abs() < 1e-3);
    }

    #[test]
    fn matrix_is_symmetric_with_zero_diagonal() {
        let mut source = InMemoryCoefficients::new(2, 16000);
        for u in 0..5u32 {
            let rows: Vec<Vec<f32>> = (0..(u + 1)).map(|k| vec![u as f32 * 0.3, k as f32 * 0.1]).collect();
            source.insert(u, &rows);
        }
        let vectors: Vec<FeatureVector> = (0..5).map(|u| fv(u, u as f32, 0.1)).collect();
        for alignment in [AlignmentStrategy::Stretch, AlignmentStrategy::Dtw] {
            let engine = DistanceEngine::new(&source, &schema(), alignment);
            let m = engine.compute_matrix(&vectors).unwrap();
            for i in 0..5 {
                assert_eq!(m.get(i, i), 0.0);
                for j in 0..5 {
                    assert_eq!(m.get(i, j), m.get(j, i));
                }
            }
        }
    }

    #[test]
    fn missing_coefficients_are_data_error() {
        let source = InMemoryCoefficients::new(2, 16000);
        let engine = DistanceEngine::new(&source, &schema(), AlignmentStrategy::Stretch);
        let err = engine.compute_matrix(&[fv(7, 5.0, 0.1)]).unwrap_err();
        assert!(matches!(err, Error::Data { unit: 7, .. }));
    }

    #[test]
    fn rows_end_with_newline() {
        let mut m = DistanceMatrix::zeros(2);
        m.set_pair(0, 1, 1.5);
        let mut out = Vec::new();
        m.write_to(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "0 1.5 \n1.5 0 \n");
    }
}
