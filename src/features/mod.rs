//! Unit feature vectors and the schema that describes them.

mod schema;
mod store;
mod vector;

pub use schema::{
    FeatureDef, FeatureKind, FeatureSchema, SchemaBuilder, DURATION_FEATURE, EDGE_FEATURE,
    LOGF0_FEATURE,
};
pub use store::FeatureStore;
pub use vector::FeatureVector;
