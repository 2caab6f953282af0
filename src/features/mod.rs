//! Feature preprocessing: schema, categorical encoding and normalization

pub mod encoding;
pub mod normalizer;
pub mod schema;

pub use encoding::{CategoricalEncoder, PerRunEncoder, VocabularyEncoder};
pub use normalizer::{FeatureNormalizer, FeatureVector, MISSING_SENTINEL};
pub use schema::{FeatureKind, FeatureSchema, FeatureSpec};
