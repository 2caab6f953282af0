//! Error taxonomy for the scoring service.
//!
//! Startup failures (`ConfigError`, `LoadError`) are fatal. `ValidationError`
//! and `InferenceError` are per-request and never take the process down.

use std::path::PathBuf;
use thiserror::Error;

/// Failure to load the classifier artifact.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("model artifact {path:?} is unreadable: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("model artifact {path:?} is malformed: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("unsupported model artifact {path:?} (expected .onnx or .json)")]
    UnsupportedFormat { path: PathBuf },

    #[error("model expects {model} features but the feature list has {schema}")]
    FeatureCountMismatch { model: usize, schema: usize },

    #[error("inference runtime error: {0}")]
    Runtime(String),
}

/// Fatal startup configuration error. The service must not start serving.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings: {0}")]
    Settings(#[from] config::ConfigError),

    #[error("failed to read feature list {path:?}: {source}")]
    FeatureList {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("feature list {path:?} has no `feature` column")]
    FeatureColumnMissing { path: PathBuf },

    #[error("feature list {path:?} is empty")]
    EmptySchema { path: PathBuf },

    #[error("feature list {path:?} has unknown kind {kind:?} for feature {feature:?}")]
    UnknownFeatureKind {
        path: PathBuf,
        feature: String,
        kind: String,
    },

    #[error("failed to read category vocabulary {path:?}: {reason}")]
    Vocabulary { path: PathBuf, reason: String },

    #[error("invalid setting: {0}")]
    Invalid(String),

    #[error(transparent)]
    Model(#[from] LoadError),
}

/// Malformed caller input (batch uploads, request bodies).
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("upload is not valid UTF-8")]
    NotUtf8,

    #[error("unparsable CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("upload contains no transactions")]
    Empty,

    #[error("multipart field `file` is missing")]
    MissingFile,

    #[error("missing required columns: {0:?}")]
    MissingColumns(Vec<String>),

    #[error("transaction amounts cannot be negative (row {row})")]
    NegativeAmount { row: usize },

    #[error("transaction amount {value:?} is not a number (row {row})")]
    NonNumericAmount { row: usize, value: String },

    #[error("row {row} has {fields} fields but the header has {expected}")]
    RaggedRow {
        row: usize,
        fields: usize,
        expected: usize,
    },

    #[error("invalid field {field}: {reason}")]
    Field { field: String, reason: String },
}

/// Unexpected failure while scoring one record.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("feature vector has {actual} entries, classifier expects {expected}")]
    FeatureCount { expected: usize, actual: usize },

    #[error("classifier returned an invalid probability: {0}")]
    InvalidProbability(f64),

    #[error("classifier failure: {0}")]
    Classifier(String),

    #[error("record {index}: {source}")]
    Record {
        index: usize,
        #[source]
        source: Box<InferenceError>,
    },
}

impl InferenceError {
    /// Attach the batch row index to a record failure.
    pub fn at_record(self, index: usize) -> Self {
        InferenceError::Record {
            index,
            source: Box::new(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_error_message() {
        let err = InferenceError::InvalidProbability(1.5).at_record(3);
        assert_eq!(
            err.to_string(),
            "record 3: classifier returned an invalid probability: 1.5"
        );
    }

    #[test]
    fn test_load_error_wraps_into_config_error() {
        let err: ConfigError = LoadError::FeatureCountMismatch { model: 10, schema: 12 }.into();
        assert!(err.to_string().contains("10 features"));
    }
}
