//! Fraud Scoring API Library
//!
//! Scores e-commerce transactions for fraud: raw transactions are normalized
//! into the model's fixed feature order, scored by a gradient-boosted
//! classifier and turned into a verdict with a risk band.

pub mod config;
pub mod decision;
pub mod error;
pub mod features;
pub mod http;
pub mod input;
pub mod metrics;
pub mod models;
pub mod service;
pub mod types;

pub use config::AppConfig;
pub use decision::DecisionPolicy;
pub use error::{ConfigError, InferenceError, LoadError, ValidationError};
pub use features::{FeatureNormalizer, FeatureSchema, FeatureVector};
pub use models::RiskClassifier;
pub use service::PredictionService;
pub use types::{BatchSummary, RawTransaction, RawValue, RiskLevel, Verdict};
