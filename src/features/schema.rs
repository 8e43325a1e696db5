//! The feature schema: names, kinds and enumerated values of every field of a
//! unit feature vector.

use crate::error::{Error, Result};
use crate::header::{
    read_count, read_f32, read_i16, read_str, read_u8, write_count, write_f32, write_i16,
    write_str, write_u8,
};
use rustc_hash::FxHashMap;
use std::io::{Read, Write};

use super::FeatureVector;

/// Name of the byte field that marks boundary units.
pub const EDGE_FEATURE: &str = "edge";
/// Float field holding the unit's mean log F0.
pub const LOGF0_FEATURE: &str = "unit_logf0";
/// Float field holding the unit's duration.
pub const DURATION_FEATURE: &str = "unit_duration";

/// Storage class of a field. Byte and short fields are enumerations whose
/// stored value indexes the field's value list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    Byte,
    Short,
    Float,
}

impl FeatureKind {
    pub fn is_enum(self) -> bool {
        !matches!(self, FeatureKind::Float)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureDef {
    pub name: String,
    pub kind: FeatureKind,
    pub weight: f32,
    /// Value names of an enum field; empty for float fields.
    pub values: Vec<String>,
    /// Weighting function of a float field; empty for enum fields.
    pub weight_function: String,
}

/// Ordered field list. Feature indices run over byte fields, then short
/// fields, then float fields; that order is fixed once built.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSchema {
    features: Vec<FeatureDef>,
    num_bytes: usize,
    num_shorts: usize,
    by_name: FxHashMap<String, usize>,
    value_lookup: Vec<FxHashMap<String, u16>>,
}

/// Incremental construction of a [`FeatureSchema`].
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    bytes: Vec<FeatureDef>,
    shorts: Vec<FeatureDef>,
    floats: Vec<FeatureDef>,
}

impl SchemaBuilder {
    pub fn byte(mut self, name: &str, values: &[&str]) -> Self {
        self.bytes.push(enum_def(name, FeatureKind::Byte, values));
        self
    }

    pub fn short(mut self, name: &str, values: &[&str]) -> Self {
        self.shorts.push(enum_def(name, FeatureKind::Short, values));
        self
    }

    pub fn float(mut self, name: &str) -> Self {
        self.floats.push(FeatureDef {
            name: name.to_string(),
            kind: FeatureKind::Float,
            weight: 1.0,
            values: Vec::new(),
            weight_function: String::new(),
        });
        self
    }

    pub fn build(self) -> Result<FeatureSchema> {
        FeatureSchema::from_parts(self.bytes, self.shorts, self.floats)
    }
}

fn enum_def(name: &str, kind: FeatureKind, values: &[&str]) -> FeatureDef {
    FeatureDef {
        name: name.to_string(),
        kind,
        weight: 1.0,
        values: values.iter().map(|v| v.to_string()).collect(),
        weight_function: String::new(),
    }
}

const SCHEMA_CONTEXT: &str = "feature schema";

impl FeatureSchema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Assembles a schema from per-kind field lists, checking value-count
    /// limits and name uniqueness.
    pub fn from_parts(
        bytes: Vec<FeatureDef>,
        shorts: Vec<FeatureDef>,
        floats: Vec<FeatureDef>,
    ) -> Result<Self> {
        let num_bytes = bytes.len();
        let num_shorts = shorts.len();
        let features: Vec<FeatureDef> = bytes.into_iter().chain(shorts).chain(floats).collect();

        let mut by_name = FxHashMap::default();
        let mut value_lookup = Vec::with_capacity(features.len());
        for (idx, def) in features.iter().enumerate() {
            let limit = match def.kind {
                FeatureKind::Byte => u8::MAX as usize,
                FeatureKind::Short => i16::MAX as usize,
                FeatureKind::Float => 0,
            };
            if def.values.len() > limit {
                return Err(Error::format(
                    SCHEMA_CONTEXT,
                    format!(
                        "feature '{}' declares {} values, at most {} allowed",
                        def.name,
                        def.values.len(),
                        limit
                    ),
                ));
            }
            if by_name.insert(def.name.clone(), idx).is_some() {
                return Err(Error::format(
                    SCHEMA_CONTEXT,
                    format!("duplicate feature name '{}'", def.name),
                ));
            }
            let lookup = def
                .values
                .iter()
                .enumerate()
                .map(|(i, v)| (v.clone(), i as u16))
                .collect();
            value_lookup.push(lookup);
        }

        Ok(FeatureSchema {
            features,
            num_bytes,
            num_shorts,
            by_name,
            value_lookup,
        })
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    #[inline(always)]
    pub fn num_bytes(&self) -> usize {
        self.num_bytes
    }

    #[inline(always)]
    pub fn num_shorts(&self) -> usize {
        self.num_shorts
    }

    #[inline(always)]
    pub fn num_floats(&self) -> usize {
        self.features.len() - self.num_bytes - self.num_shorts
    }

    /// # Panics
    /// Panics if `idx` is out of bounds.
    #[inline(always)]
    pub fn feature(&self, idx: usize) -> &FeatureDef {
        &self.features[idx]
    }

    pub fn features(&self) -> &[FeatureDef] {
        &self.features
    }

    /// # Panics
    /// Panics if `idx` is out of bounds.
    #[inline(always)]
    pub fn kind(&self, idx: usize) -> FeatureKind {
        self.features[idx].kind
    }

    #[inline(always)]
    pub fn name(&self, idx: usize) -> &str {
        &self.features[idx].name
    }

    pub fn feature_index(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Like [`feature_index`](Self::feature_index) but fails with a config error.
    pub fn require_feature(&self, name: &str) -> Result<usize> {
        self.feature_index(name)
            .ok_or_else(|| Error::Config(format!("unknown feature '{name}'")))
    }

    pub fn edge_feature_index(&self) -> Option<usize> {
        self.feature_index(EDGE_FEATURE)
            .filter(|&idx| self.kind(idx) == FeatureKind::Byte)
    }

    /// Number of values an enum field can take; zero for float fields.
    pub fn num_values(&self, idx: usize) -> usize {
        self.features[idx].values.len()
    }

    pub fn value_index(&self, idx: usize, value: &str) -> Option<u16> {
        self.value_lookup.get(idx)?.get(value).copied()
    }

    pub fn value_name(&self, idx: usize, value: u16) -> Option<&str> {
        self.features
            .get(idx)?
            .values
            .get(value as usize)
            .map(String::as_str)
    }

    /// Value name for display; falls back to the raw number for values the
    /// schema does not declare.
    pub fn display_value(&self, idx: usize, value: u16) -> String {
        match self.value_name(idx, value) {
            Some(name) => name.to_string(),
            None => value.to_string(),
        }
    }

    /// Space-separated feature values of `fv` in schema order: value names
    /// for enum fields, numbers for float fields.
    pub fn feature_string(&self, fv: &FeatureVector) -> String {
        let mut parts = Vec::with_capacity(self.len());
        for idx in 0..self.len() {
            match self.kind(idx) {
                FeatureKind::Float => parts.push(fv.float_value(idx).to_string()),
                _ => parts.push(self.display_value(idx, fv.enum_value(idx))),
            }
        }
        parts.join(" ")
    }

    /// Writes the learner's field description: one line per field, enum
    /// values quoted, fields named in `ignored` flagged so the learner does not
    /// split on them.
    pub fn write_learner_description<W: Write>(&self, w: &mut W, ignored: &[&str]) -> Result<()> {
        writeln!(w, "(")?;
        writeln!(w, "(occurid cluster)")?;
        for def in &self.features {
            write!(w, "( {}", def.name)?;
            if ignored.contains(&def.name.as_str()) {
                write!(w, " ignore")?;
            }
            match def.kind {
                FeatureKind::Float => write!(w, " float")?,
                _ => {
                    for value in &def.values {
                        write!(w, "  \"{}\"", value.replace('"', "\\\""))?;
                    }
                }
            }
            writeln!(w, " )")?;
        }
        writeln!(w, ")")?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let ctx = SCHEMA_CONTEXT;
        let num_bytes = read_count(r, ctx, "byte feature")?;
        let mut bytes = Vec::with_capacity(num_bytes.min(1 << 16));
        for _ in 0..num_bytes {
            let weight = read_f32(r, ctx)?;
            let name = read_str(r, ctx)?;
            let n = read_u8(r, ctx)? as usize;
            let values = (0..n).map(|_| read_str(r, ctx)).collect::<Result<_>>()?;
            bytes.push(FeatureDef {
                name,
                kind: FeatureKind::Byte,
                weight,
                values,
                weight_function: String::new(),
            });
        }

        let num_shorts = read_count(r, ctx, "short feature")?;
        let mut shorts = Vec::with_capacity(num_shorts.min(1 << 16));
        for _ in 0..num_shorts {
            let weight = read_f32(r, ctx)?;
            let name = read_str(r, ctx)?;
            let n = read_i16(r, ctx)?;
            let n = usize::try_from(n)
                .map_err(|_| Error::format(ctx, format!("feature '{name}' has {n} values")))?;
            let values = (0..n).map(|_| read_str(r, ctx)).collect::<Result<_>>()?;
            shorts.push(FeatureDef {
                name,
                kind: FeatureKind::Short,
                weight,
                values,
                weight_function: String::new(),
            });
        }

        let num_floats = read_count(r, ctx, "float feature")?;
        let mut floats = Vec::with_capacity(num_floats.min(1 << 16));
        for _ in 0..num_floats {
            let weight = read_f32(r, ctx)?;
            let weight_function = read_str(r, ctx)?;
            let name = read_str(r, ctx)?;
            floats.push(FeatureDef {
                name,
                kind: FeatureKind::Float,
                weight,
                values: Vec::new(),
                weight_function,
            });
        }

        Self::from_parts(bytes, shorts, floats)
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        let (bytes, rest) = self.features.split_at(self.num_bytes);
        let (shorts, floats) = rest.split_at(self.num_shorts);

        write_count(w, bytes.len(), "byte features")?;
        for def in bytes {
            write_f32(w, def.weight)?;
            write_str(w, &def.name)?;
            write_u8(w, def.values.len() as u8)?;
            for v in &def.values {
                write_str(w, v)?;
            }
        }
        write_count(w, shorts.len(), "short features")?;
        for def in shorts {
            write_f32(w, def.weight)?;
            write_str(w, &def.name)?;
            write_i16(w, def.values.len() as i16)?;
            for v in &def.values {
                write_str(w, v)?;
            }
        }
        write_count(w, floats.len(), "float features")?;
        for def in floats {
            write_f32(w, def.weight)?;
            write_str(w, &def.weight_function)?;
            write_str(w, &def.name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn schema() -> FeatureSchema {
        FeatureSchema::builder()
            .byte("phone", &["0", "a", "b\"q"])
            .byte("edge", &["0", "start", "end"])
            .short("word", &["0", "hello"])
            .float("unit_duration")
            .build()
            .unwrap()
    }

    #[test]
    fn indices_run_bytes_shorts_floats() {
        let s = schema();
        assert_eq!(s.feature_index("phone"), Some(0));
        assert_eq!(s.feature_index("word"), Some(2));
        assert_eq!(s.feature_index("unit_duration"), Some(3));
        assert_eq!(s.num_floats(), 1);
        assert_eq!(s.edge_feature_index(), Some(1));
        assert_eq!(s.value_index(0, "a"), Some(1));
        assert_eq!(s.value_index(0, "zz"), None);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = FeatureSchema::builder()
            .byte("phone", &["0"])
            .float("phone")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn binary_layout_reads_back() {
        let s = schema();
        let mut buf = Vec::new();
        s.write_to(&mut buf).unwrap();
        let back = FeatureSchema::read_from(&mut Cursor::new(buf)).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn learner_description_quotes_and_ignores() {
        let s = schema();
        let mut out = Vec::new();
        s.write_learner_description(&mut out, &["unit_duration"]).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "(");
        assert_eq!(lines[1], "(occurid cluster)");
        assert_eq!(lines[2], "( phone  \"0\"  \"a\"  \"b\\\"q\" )");
        assert_eq!(lines[5], "( unit_duration ignore float )");
        assert_eq!(lines[6], ")");
    }
}
