//! Reader and writer for the unit feature file.

use crate::error::{Error, IoContext, Result};
use crate::header::{
    expect_eof, read_count, read_f32, read_header, read_i16, read_u8, write_count, write_f32,
    write_header, write_i16, write_u8, ContentType,
};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use super::{FeatureSchema, FeatureVector};

/// Schema plus every unit's feature vector, in unit-index order.
#[derive(Debug, Clone)]
pub struct FeatureStore {
    pub schema: FeatureSchema,
    pub vectors: Vec<FeatureVector>,
}

impl FeatureStore {
    pub fn new(schema: FeatureSchema, vectors: Vec<FeatureVector>) -> Self {
        FeatureStore { schema, vectors }
    }

    /// Loads a feature file.
    ///
    /// Fails with a format error when the header does not announce unit
    /// features, when a record is truncated, or when a stored enum value lies
    /// outside its field's declared values.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).at_path(path)?;
        let mut reader = BufReader::new(file);
        Self::read_from(&mut reader, &path.display().to_string())
    }

    pub fn read_from<R: Read>(r: &mut R, context: &str) -> Result<Self> {
        read_header(r, ContentType::UnitFeatures, context)?;
        let schema = FeatureSchema::read_from(r)?;
        let num_units = read_count(r, context, "unit")?;

        let (nb, ns, nf) = (schema.num_bytes(), schema.num_shorts(), schema.num_floats());
        let mut vectors = Vec::with_capacity(num_units.min(1 << 16));
        for unit in 0..num_units {
            let mut bytes = Vec::with_capacity(nb);
            for idx in 0..nb {
                let v = read_u8(r, context)?;
                check_value(&schema, idx, v as i32, unit, context)?;
                bytes.push(v);
            }
            let mut shorts = Vec::with_capacity(ns);
            for i in 0..ns {
                let v = read_i16(r, context)?;
                check_value(&schema, nb + i, v as i32, unit, context)?;
                shorts.push(v as u16);
            }
            let floats = (0..nf).map(|_| read_f32(r, context)).collect::<Result<Vec<_>>>()?;
            vectors.push(FeatureVector::new(unit as u32, bytes, shorts, floats));
        }
        expect_eof(r, context)?;

        tracing::debug!(units = vectors.len(), features = schema.len(), "loaded feature file {context}");
        Ok(FeatureStore { schema, vectors })
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).at_path(path)?;
        let mut writer = BufWriter::new(file);
        self.write_to(&mut writer)?;
        writer.flush().at_path(path)?;
        Ok(())
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        write_header(w, ContentType::UnitFeatures)?;
        self.schema.write_to(w)?;
        write_count(w, self.vectors.len(), "units")?;
        for fv in &self.vectors {
            for &b in fv.bytes() {
                write_u8(w, b)?;
            }
            for &s in fv.shorts() {
                write_i16(w, s as i16)?;
            }
            for &f in fv.floats() {
                write_f32(w, f)?;
            }
        }
        Ok(())
    }

    /// Removes boundary units, returning how many were dropped. A schema
    /// without an edge field drops nothing.
    pub fn remove_edge_vectors(&mut self) -> usize {
        let Some(edge) = self.schema.edge_feature_index() else {
            return 0;
        };
        let before = self.vectors.len();
        self.vectors.retain(|fv| !fv.is_edge_vector(edge));
        before - self.vectors.len()
    }
}

fn check_value(schema: &FeatureSchema, idx: usize, value: i32, unit: usize, context: &str) -> Result<()> {
    let n = schema.num_values(idx) as i32;
    if value < 0 || value >= n {
        return Err(Error::format(
            context,
            format!(
                "unit {unit}: value {value} of feature '{}' outside its {n} declared values",
                schema.name(idx)
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn store() -> FeatureStore {
        let schema = FeatureSchema::builder()
            .byte("phone", &["0", "a", "e"])
            .byte("edge", &["0", "start"])
            .short("syl", &["0", "1", "2"])
            .float("unit_duration")
            .build()
            .unwrap();
        let vectors = vec![
            FeatureVector::new(0, vec![0, 1], vec![0], vec![0.0]),
            FeatureVector::new(1, vec![1, 0], vec![2], vec![0.12]),
            FeatureVector::new(2, vec![2, 0], vec![1], vec![0.08]),
            FeatureVector::new(3, vec![0, 1], vec![0], vec![0.0]),
        ];
        FeatureStore::new(schema, vectors)
    }

    #[test]
    fn file_reads_back_identically() {
        let s = store();
        let mut buf = Vec::new();
        s.write_to(&mut buf).unwrap();
        let back = FeatureStore::read_from(&mut Cursor::new(buf), "mem").unwrap();
        assert_eq!(back.schema, s.schema);
        assert_eq!(back.vectors, s.vectors);
    }

    #[test]
    fn truncated_file_is_format_error() {
        let mut buf = Vec::new();
        store().write_to(&mut buf).unwrap();
        buf.truncate(buf.len() - 3);
        let err = FeatureStore::read_from(&mut Cursor::new(buf), "mem").unwrap_err();
        assert!(matches!(err, Error::Format { .. }), "{err}");
    }

    #[test]
    fn huge_counts_are_format_errors() {
        use crate::header::write_i32;

        let mut features = Vec::new();
        write_header(&mut features, ContentType::UnitFeatures).unwrap();
        write_i32(&mut features, i32::MAX).unwrap();
        let err = FeatureStore::read_from(&mut Cursor::new(features), "mem").unwrap_err();
        assert!(matches!(err, Error::Format { .. }), "{err}");

        let mut units = Vec::new();
        write_header(&mut units, ContentType::UnitFeatures).unwrap();
        store().schema.write_to(&mut units).unwrap();
        write_i32(&mut units, i32::MAX).unwrap();
        let err = FeatureStore::read_from(&mut Cursor::new(units), "mem").unwrap_err();
        assert!(matches!(err, Error::Format { .. }), "{err}");
    }

    #[test]
    fn out_of_range_value_is_format_error() {
        let mut s = store();
        s.vectors[1] = FeatureVector::new(1, vec![7, 0], vec![2], vec![0.12]);
        let mut buf = Vec::new();
        s.write_to(&mut buf).unwrap();
        let err = FeatureStore::read_from(&mut Cursor::new(buf), "mem").unwrap_err();
        assert!(err.to_string().contains("outside"));
    }

    #[test]
    fn edge_vectors_are_removed() {
        let mut s = store();
        assert_eq!(s.remove_edge_vectors(), 2);
        let units: Vec<u32> = s.vectors.iter().map(|v| v.unit_index()).collect();
        assert_eq!(units, vec![1, 2]);
    }
}
