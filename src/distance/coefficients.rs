//! Per-unit acoustic coefficient frames and the sources that supply them.

use crate::error::{Error, IoContext, Result};
use crate::header::{
    expect_eof, read_count, read_f32, read_header, write_count, write_f32, write_header, ContentType,
};
use rustc_hash::FxHashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// A unit's frame sequence, stored row-major with a fixed dimension.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frames {
    dimension: usize,
    values: Vec<f32>,
}

impl Frames {
    /// # Panics
    /// Panics if `values.len()` is not a multiple of `dimension`.
    pub fn new(dimension: usize, values: Vec<f32>) -> Self {
        assert!(
            dimension == 0 || values.len() % dimension == 0,
            "{} values do not form frames of dimension {dimension}",
            values.len()
        );
        Frames { dimension, values }
    }

    pub fn from_rows(dimension: usize, rows: &[Vec<f32>]) -> Self {
        let values = rows.iter().flat_map(|r| r.iter().copied()).collect();
        Frames::new(dimension, values)
    }

    #[inline(always)]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of frames.
    #[inline(always)]
    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.values.len() / self.dimension
        }
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// # Panics
    /// Panics if `i` is out of bounds.
    #[inline(always)]
    pub fn frame(&self, i: usize) -> &[f32] {
        &self.values[i * self.dimension..(i + 1) * self.dimension]
    }

    pub fn iter(&self) -> impl Iterator<Item = &[f32]> {
        self.values.chunks_exact(self.dimension.max(1))
    }
}

/// Supplies the coefficient frames of a unit.
pub trait CoefficientSource {
    /// Number of coefficients per frame.
    fn dimension(&self) -> usize;
    fn sample_rate(&self) -> u32;
    /// Fails with a data error when the unit has no entry.
    fn frames(&self, unit: u32) -> Result<Frames>;
}

/// Coefficients held in memory, keyed by unit index.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCoefficients {
    dimension: usize,
    sample_rate: u32,
    units: FxHashMap<u32, Frames>,
}

impl InMemoryCoefficients {
    pub fn new(dimension: usize, sample_rate: u32) -> Self {
        InMemoryCoefficients {
            dimension,
            sample_rate,
            units: FxHashMap::default(),
        }
    }

    pub fn insert(&mut self, unit: u32, rows: &[Vec<f32>]) {
        self.units.insert(unit, Frames::from_rows(self.dimension, rows));
    }
}

impl CoefficientSource for InMemoryCoefficients {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn frames(&self, unit: u32) -> Result<Frames> {
        self.units
            .get(&unit)
            .cloned()
            .ok_or_else(|| Error::data(unit, "no coefficient frames for unit"))
    }
}

/// Coefficient file: header, dimension, sample rate, unit count, then for each
/// unit its frame count followed by the frame values.
#[derive(Debug, Clone)]
pub struct CoefficientFile {
    dimension: usize,
    sample_rate: u32,
    units: Vec<Frames>,
}

impl CoefficientFile {
    pub fn new(dimension: usize, sample_rate: u32, units: Vec<Frames>) -> Self {
        CoefficientFile {
            dimension,
            sample_rate,
            units,
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).at_path(path)?;
        let mut r = BufReader::new(file);
        Self::read_from(&mut r, &path.display().to_string())
    }

    pub fn read_from<R: Read>(r: &mut R, context: &str) -> Result<Self> {
        read_header(r, ContentType::Coefficients, context)?;
        let dimension = read_count(r, context, "dimension")?;
        let sample_rate = read_count(r, context, "sample rate")? as u32;
        let num_units = read_count(r, context, "unit")?;
        let mut units = Vec::with_capacity(num_units.min(1 << 16));
        for _ in 0..num_units {
            let n = read_count(r, context, "frame")?;
            let values = (0..n * dimension)
                .map(|_| read_f32(r, context))
                .collect::<Result<Vec<_>>>()?;
            units.push(Frames::new(dimension, values));
        }
        expect_eof(r, context)?;
        tracing::debug!(units = units.len(), dimension, "loaded coefficient file {context}");
        Ok(CoefficientFile {
            dimension,
            sample_rate,
            units,
        })
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let file = File::create(path).at_path(path)?;
        let mut w = BufWriter::new(file);
        self.write_to(&mut w)?;
        w.flush().at_path(path)?;
        Ok(())
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        write_header(w, ContentType::Coefficients)?;
        write_count(w, self.dimension, "dimension")?;
        write_count(w, self.sample_rate as usize, "sample rate")?;
        write_count(w, self.units.len(), "units")?;
        for frames in &self.units {
            write_count(w, frames.len(), "frames")?;
            for frame in frames.iter() {
                for &v in frame {
                    write_f32(w, v)?;
                }
            }
        }
        Ok(())
    }

    pub fn num_units(&self) -> usize {
        self.units.len()
    }
}

impl CoefficientSource for CoefficientFile {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn frames(&self, unit: u32) -> Result<Frames> {
        self.units.get(unit as usize).cloned().ok_or_else(|| {
            Error::data(unit, format!("coefficient file holds only {} units", self.units.len()))
        })
    }
}
