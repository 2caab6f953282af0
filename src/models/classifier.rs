//! Risk classifier abstraction and artifact loading

use crate::error::{InferenceError, LoadError};
use crate::features::normalizer::FeatureVector;
use crate::models::onnx::OnnxClassifier;
use crate::models::tree::TreeEnsembleClassifier;
use std::path::Path;

/// A pre-trained binary classifier producing P(fraud).
///
/// Implementations never mutate observable state while scoring and may be
/// shared across concurrent requests.
pub trait RiskClassifier: Send + Sync {
    /// Fraud probability for one feature vector, in [0, 1].
    fn score(&self, vector: &FeatureVector) -> Result<f64, InferenceError>;

    /// Number of input features the model accepts.
    fn feature_count(&self) -> usize;

    /// Short backend description for logs.
    fn backend(&self) -> &'static str;
}

/// Load a classifier artifact, picking the backend from the file extension.
///
/// `.onnx` files run on ONNX Runtime; `.json` files are XGBoost tree dumps
/// evaluated natively. The artifact must accept exactly `feature_names.len()`
/// features.
pub fn load_classifier<P: AsRef<Path>>(
    path: P,
    feature_names: &[String],
    onnx_threads: usize,
) -> Result<Box<dyn RiskClassifier>, LoadError> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    let classifier: Box<dyn RiskClassifier> = match extension.as_deref() {
        Some("onnx") => Box::new(OnnxClassifier::load(path, feature_names.len(), onnx_threads)?),
        Some("json") => Box::new(TreeEnsembleClassifier::load(path, feature_names)?),
        _ => {
            return Err(LoadError::UnsupportedFormat {
                path: path.to_path_buf(),
            })
        }
    };

    Ok(classifier)
}

/// Validate a classifier output before it leaves the scoring layer.
pub(crate) fn checked_probability(probability: f64) -> Result<f64, InferenceError> {
    if (0.0..=1.0).contains(&probability) {
        Ok(probability)
    } else {
        Err(InferenceError::InvalidProbability(probability))
    }
}

/// Reject vectors whose length does not match the model input.
pub(crate) fn check_feature_count(expected: usize, vector: &FeatureVector) -> Result<(), InferenceError> {
    if vector.len() == expected {
        Ok(())
    } else {
        Err(InferenceError::FeatureCount {
            expected,
            actual: vector.len(),
        })
    }
}
