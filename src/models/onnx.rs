//! ONNX Runtime backed classifier

use crate::error::{InferenceError, LoadError};
use crate::features::normalizer::{FeatureVector, MISSING_SENTINEL};
use crate::models::classifier::{check_feature_count, checked_probability, RiskClassifier};
use ort::memory::Allocator;
use ort::session::{builder::GraphOptimizationLevel, Session, SessionOutputs};
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType, DynValue, Tensor};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

/// Gradient-boosted classifier exported to ONNX.
///
/// Accepts a `[1, n]` f32 tensor. Probabilities are read from either a
/// `[1, 2]` tensor or the `seq(map(int64, float))` output that sklearn-style
/// converters emit.
pub struct OnnxClassifier {
    /// `Session::run` needs exclusive access
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    feature_count: usize,
}

impl OnnxClassifier {
    /// Load a model and verify it accepts `feature_count` inputs.
    pub fn load<P: AsRef<Path>>(path: P, feature_count: usize, threads: usize) -> Result<Self, LoadError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(LoadError::Unreadable {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
            });
        }

        info!(path = %path.display(), threads = threads, "Loading ONNX model");

        let malformed = |e: ort::Error| LoadError::Malformed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };

        let session = Session::builder()
            .map_err(malformed)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(malformed)?
            .with_intra_threads(threads.max(1))
            .map_err(malformed)?
            .commit_from_file(path)
            .map_err(malformed)?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "float_input".to_string());

        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob"))
            .or_else(|| session.outputs.last())
            .map(|o| o.name.clone())
            .unwrap_or_else(|| "probabilities".to_string());

        let classifier = Self {
            session: Mutex::new(session),
            input_name,
            output_name,
            feature_count,
        };

        // A model that cannot score a schema-length vector is incompatible.
        let probe = FeatureVector::new(vec![MISSING_SENTINEL; feature_count]);
        classifier.score(&probe).map_err(|e| {
            LoadError::Runtime(format!(
                "model rejected a {}-feature probe input: {}",
                feature_count, e
            ))
        })?;

        info!(
            input = %classifier.input_name,
            output = %classifier.output_name,
            features = feature_count,
            "ONNX model loaded successfully"
        );

        Ok(classifier)
    }

    fn run(&self, features: &[f32]) -> Result<f64, InferenceError> {
        let runtime_err = |e: ort::Error| InferenceError::Classifier(e.to_string());

        let shape = vec![1_i64, features.len() as i64];
        let input_tensor = Tensor::from_array((shape, features.to_vec())).map_err(runtime_err)?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| InferenceError::Classifier(format!("session lock poisoned: {}", e)))?;

        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input_tensor])
            .map_err(runtime_err)?;

        extract_probability(&outputs, &self.output_name)
    }
}

impl RiskClassifier for OnnxClassifier {
    fn score(&self, vector: &FeatureVector) -> Result<f64, InferenceError> {
        check_feature_count(self.feature_count, vector)?;
        let probability = self.run(vector.as_slice())?;
        checked_probability(probability)
    }

    fn feature_count(&self) -> usize {
        self.feature_count
    }

    fn backend(&self) -> &'static str {
        "onnx"
    }
}

/// Read P(fraud) from the named output, falling back to any non-label output.
fn extract_probability(outputs: &SessionOutputs, output_name: &str) -> Result<f64, InferenceError> {
    if let Some(output) = outputs.get(output_name) {
        if let Some(prob) = probability_from_value(&output) {
            return Ok(prob);
        }
    }

    for (name, output) in outputs.iter() {
        if name.contains("label") {
            continue;
        }
        if let Some(prob) = probability_from_value(&output) {
            debug!(output = %name, prob = prob, "Probability read from fallback output");
            return Ok(prob);
        }
    }

    Err(InferenceError::Classifier(
        "model produced no readable probability output".to_string(),
    ))
}

fn probability_from_value(output: &DynValue) -> Option<f64> {
    if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
        let dims: Vec<i64> = shape.iter().copied().collect();
        return fraud_probability_from_tensor(&dims, data);
    }

    let dtype = output.dtype();
    if DynSequenceValueType::can_downcast(&dtype) {
        return fraud_probability_from_sequence_map(output);
    }

    None
}

/// `[batch, classes]` or `[classes]`: class 1 is fraud; a single column is P(fraud).
fn fraud_probability_from_tensor(dims: &[i64], data: &[f32]) -> Option<f64> {
    let classes = match dims {
        [_, classes] | [classes] => *classes,
        _ => return None,
    };

    match classes {
        c if c >= 2 => data.get(1).map(|&p| p as f64),
        1 => data.first().map(|&p| p as f64),
        _ => None,
    }
}

/// `seq(map(int64, float))` with one map per row.
fn fraud_probability_from_sequence_map(output: &DynValue) -> Option<f64> {
    let allocator = Allocator::default();

    let sequence = output.downcast_ref::<DynSequenceValueType>().ok()?;
    let maps = sequence
        .try_extract_sequence::<DynMapValueType>(&allocator)
        .ok()?;
    let pairs = maps.first()?.try_extract_key_values::<i64, f32>().ok()?;

    if let Some((_, prob)) = pairs.iter().find(|(class, _)| *class == 1) {
        return Some(*prob as f64);
    }
    pairs
        .iter()
        .find(|(class, _)| *class == 0)
        .map(|(_, prob)| 1.0 - *prob as f64)
}
