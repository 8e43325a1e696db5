/// One unit's feature record. Field slices follow the schema's
/// byte/short/float partition, so a feature index addresses the
/// concatenation `bytes ++ shorts ++ floats`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    unit_index: u32,
    bytes: Box<[u8]>,
    shorts: Box<[u16]>,
    floats: Box<[f32]>,
}

impl FeatureVector {
    pub fn new(unit_index: u32, bytes: Vec<u8>, shorts: Vec<u16>, floats: Vec<f32>) -> Self {
        FeatureVector {
            unit_index,
            bytes: bytes.into_boxed_slice(),
            shorts: shorts.into_boxed_slice(),
            floats: floats.into_boxed_slice(),
        }
    }

    /// Index of the unit in the corpus unit table.
    #[inline(always)]
    pub fn unit_index(&self) -> u32 {
        self.unit_index
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.bytes.len() + self.shorts.len() + self.floats.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn shorts(&self) -> &[u16] {
        &self.shorts
    }

    pub fn floats(&self) -> &[f32] {
        &self.floats
    }

    /// Value of an enum (byte or short) field.
    /// # Panics
    /// Panics if `idx` does not address an enum field of this vector.
    #[inline(always)]
    pub fn enum_value(&self, idx: usize) -> u16 {
        if idx < self.bytes.len() {
            self.bytes[idx] as u16
        } else {
            self.shorts[idx - self.bytes.len()]
        }
    }

    /// Value of a float field.
    /// # Panics
    /// Panics if `idx` does not address a float field of this vector.
    #[inline(always)]
    pub fn float_value(&self, idx: usize) -> f32 {
        self.floats[idx - self.bytes.len() - self.shorts.len()]
    }

    /// Whether `idx` is a float field of this vector.
    #[inline(always)]
    pub fn is_float_field(&self, idx: usize) -> bool {
        idx >= self.bytes.len() + self.shorts.len() && idx < self.len()
    }

    /// A vector marks a boundary unit when its edge field is non-zero.
    #[inline(always)]
    pub fn is_edge_vector(&self, edge_index: usize) -> bool {
        self.enum_value(edge_index) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_span_all_partitions() {
        let fv = FeatureVector::new(9, vec![3, 0], vec![300], vec![0.25, 1.5]);
        assert_eq!(fv.len(), 5);
        assert_eq!(fv.enum_value(0), 3);
        assert_eq!(fv.enum_value(2), 300);
        assert!(!fv.is_float_field(2));
        assert!(fv.is_float_field(3));
        assert_eq!(fv.float_value(4), 1.5);
        assert_eq!(fv.unit_index(), 9);
    }

    #[test]
    fn edge_detection_uses_nonzero_value() {
        let fv = FeatureVector::new(0, vec![1, 0], vec![], vec![]);
        assert!(!fv.is_edge_vector(1));
        let fv = FeatureVector::new(0, vec![1, 2], vec![], vec![]);
        assert!(fv.is_edge_vector(1));
    }
}
