//! Configuration management for the scoring service

use crate::decision::DEFAULT_THRESHOLD;
use crate::error::ConfigError;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Default settings file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Environment variable overriding the settings file path.
pub const CONFIG_PATH_ENV: &str = "FRAUD_API_CONFIG";

/// How textual fields are turned into integer codes
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EncodingStrategy {
    /// Enumerate the values seen in each normalization run (unstable codes)
    #[default]
    PerRun,
    /// Look codes up in a vocabulary persisted at training time
    Vocabulary,
}

/// What a batch does when one record fails to score
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort the whole batch on the first failing record
    #[default]
    FailFast,
    /// Score every record, marking failures in place
    BestEffort,
}

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins; `*` allows any
    pub cors_origins: Vec<String>,
    /// Largest accepted request body, batch uploads included
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            max_upload_bytes: 50 * 1024 * 1024,
        }
    }
}

/// Model artifact configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Classifier artifact (`.onnx` or XGBoost `.json` dump)
    pub model_path: String,
    /// Training feature list (CSV with a `feature` column)
    pub feature_names_path: String,
    pub encoding: EncodingStrategy,
    /// Required when `encoding = "vocabulary"`
    pub vocabulary_path: Option<String>,
    /// Intra-op threads for ONNX inference
    pub onnx_threads: usize,
    /// Static model card reported by the info endpoint
    pub info: ModelCard,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_path: "models/api_model_xgb.onnx".to_string(),
            feature_names_path: "models/api_feature_names.csv".to_string(),
            encoding: EncodingStrategy::PerRun,
            vocabulary_path: None,
            onnx_threads: 1,
            info: ModelCard::default(),
        }
    }
}

/// Historical, informational model metadata. Never recomputed at runtime.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ModelCard {
    /// Reported by the model info endpoint
    pub model_type: String,
    /// Reported by the health endpoint
    pub health_model_type: String,
    pub version: String,
    pub training_date: String,
    pub performance: BTreeMap<String, String>,
}

impl Default for ModelCard {
    fn default() -> Self {
        let performance = [
            ("precision", "12.51%"),
            ("recall", "67.32%"),
            ("f1_score", "21.10%"),
            ("roc_auc", "82.42%"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            model_type: "XGBoost Classifier".to_string(),
            health_model_type: "XGBoost (Tuned)".to_string(),
            version: "1.0 (Tuned)".to_string(),
            training_date: "2025-01-20".to_string(),
            performance,
        }
    }
}

/// Detection configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Probability at or above which a transaction is flagged
    pub threshold: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

/// Batch scoring configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub failure_policy: FailurePolicy,
    /// Verdicts returned alongside a batch summary
    pub sample_size: usize,
    /// Score records on the rayon pool
    pub parallel: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::FailFast,
            sample_size: 100,
            parallel: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
    /// Seconds between serving summaries; 0 disables them
    pub metrics_interval_secs: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            metrics_interval_secs: 60,
        }
    }
}

impl AppConfig {
    /// Load configuration from `$FRAUD_API_CONFIG` or the default path.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from_path(path)
    }

    /// Load configuration from a specific path, then apply
    /// `FRAUD_API__SECTION__KEY` environment overrides.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: AppConfig = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("FRAUD_API")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.detection.threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::Invalid(format!(
                "detection.threshold must be within [0, 1], got {}",
                threshold
            )));
        }

        if self.model.encoding == EncodingStrategy::Vocabulary && self.model.vocabulary_path.is_none() {
            return Err(ConfigError::Invalid(
                "model.vocabulary_path is required when model.encoding = \"vocabulary\"".to_string(),
            ));
        }

        if self.model.onnx_threads == 0 {
            return Err(ConfigError::Invalid("model.onnx_threads must be at least 1".to_string()));
        }

        Ok(())
    }
}
