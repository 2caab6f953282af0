//! ML model loading and scoring components

pub mod classifier;
pub mod onnx;
pub mod tree;

pub use classifier::{load_classifier, RiskClassifier};
pub use onnx::OnnxClassifier;
pub use tree::TreeEnsembleClassifier;
