//! Prediction service: normalize, score, decide.
//!
//! A `PredictionService` is built once at startup from the loaded artifacts
//! and never mutated afterwards. It replaces a process-wide model singleton:
//! handlers receive it through shared state and read it concurrently.

use crate::config::{AppConfig, EncodingStrategy, FailurePolicy, ModelCard};
use crate::decision::DecisionPolicy;
use crate::error::{ConfigError, InferenceError, LoadError};
use crate::features::encoding::{CategoricalEncoder, PerRunEncoder, VocabularyEncoder};
use crate::features::normalizer::FeatureNormalizer;
use crate::features::schema::FeatureSchema;
use crate::models::classifier::{load_classifier, RiskClassifier};
use crate::types::transaction::RawTransaction;
use crate::types::verdict::{BatchSummary, Verdict};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Liveness and model status
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub model_loaded: bool,
    pub model_type: String,
}

/// Static description of the served model
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub model_type: String,
    pub version: String,
    pub features_count: usize,
    pub optimal_threshold: f64,
    pub training_date: String,
    pub performance: BTreeMap<String, String>,
    pub backend: &'static str,
    pub encoding: &'static str,
}

/// Result for one batch row
#[derive(Debug, Clone, Serialize)]
pub struct ScoredRecord {
    /// Zero-based row index in the submitted batch
    pub transaction_id: usize,
    #[serde(flatten)]
    pub outcome: RecordOutcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum RecordOutcome {
    Scored(Verdict),
    Failed { error: String },
}

impl ScoredRecord {
    pub fn verdict(&self) -> Option<&Verdict> {
        match &self.outcome {
            RecordOutcome::Scored(verdict) => Some(verdict),
            RecordOutcome::Failed { .. } => None,
        }
    }
}

/// Per-row results of a batch, in input order, plus their summary
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub records: Vec<ScoredRecord>,
    pub summary: BatchSummary,
}

/// Orchestrates normalization, scoring and the decision policy.
pub struct PredictionService {
    normalizer: FeatureNormalizer,
    classifier: Arc<dyn RiskClassifier>,
    policy: DecisionPolicy,
    card: ModelCard,
    parallel_batches: bool,
    loaded_at: DateTime<Utc>,
}

impl PredictionService {
    pub fn new(
        normalizer: FeatureNormalizer,
        classifier: Arc<dyn RiskClassifier>,
        policy: DecisionPolicy,
        card: ModelCard,
    ) -> Result<Self, ConfigError> {
        if classifier.feature_count() != normalizer.feature_count() {
            return Err(LoadError::FeatureCountMismatch {
                model: classifier.feature_count(),
                schema: normalizer.feature_count(),
            }
            .into());
        }

        Ok(Self {
            normalizer,
            classifier,
            policy,
            card,
            parallel_batches: true,
            loaded_at: Utc::now(),
        })
    }

    /// Score batch records one after another instead of on the rayon pool.
    pub fn with_parallel_batches(mut self, parallel: bool) -> Self {
        self.parallel_batches = parallel;
        self
    }

    /// Load every artifact named in the configuration.
    ///
    /// Any failure here is fatal: the service must not serve without a model.
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        let model = &config.model;

        let (encoder, vocabulary_fields): (Arc<dyn CategoricalEncoder>, HashSet<String>) =
            match (model.encoding, &model.vocabulary_path) {
                (EncodingStrategy::Vocabulary, Some(path)) => {
                    let vocabulary = VocabularyEncoder::load(path)?;
                    let fields = vocabulary.field_names();
                    (Arc::new(vocabulary), fields)
                }
                (EncodingStrategy::Vocabulary, None) => {
                    return Err(ConfigError::Invalid(
                        "vocabulary encoding needs model.vocabulary_path".to_string(),
                    ))
                }
                (EncodingStrategy::PerRun, _) => {
                    warn!("Per-run categorical encoding: codes are not stable across calls");
                    (Arc::new(PerRunEncoder), HashSet::new())
                }
            };

        let schema = FeatureSchema::load(&model.feature_names_path, &vocabulary_fields)?;
        let names: Vec<String> = schema.names().map(str::to_string).collect();

        let classifier: Arc<dyn RiskClassifier> =
            Arc::from(load_classifier(&model.model_path, &names, model.onnx_threads)?);

        let normalizer = FeatureNormalizer::new(Arc::new(schema), encoder);
        let service = Self::new(
            normalizer,
            classifier,
            DecisionPolicy::new(config.detection.threshold),
            model.info.clone(),
        )?
        .with_parallel_batches(config.batch.parallel);

        info!(
            model_type = %service.card.model_type,
            backend = service.classifier.backend(),
            features = service.normalizer.feature_count(),
            threshold = service.policy.threshold(),
            encoding = service.normalizer.encoding_strategy(),
            "Prediction service ready"
        );

        Ok(service)
    }

    pub fn threshold(&self) -> f64 {
        self.policy.threshold()
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// A service only exists once its model is loaded.
    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            status: "healthy",
            model_loaded: true,
            model_type: self.card.health_model_type.clone(),
        }
    }

    pub fn model_info(&self) -> ModelInfo {
        ModelInfo {
            model_type: self.card.model_type.clone(),
            version: self.card.version.clone(),
            features_count: self.normalizer.feature_count(),
            optimal_threshold: self.policy.threshold(),
            training_date: self.card.training_date.clone(),
            performance: self.card.performance.clone(),
            backend: self.classifier.backend(),
            encoding: self.normalizer.encoding_strategy(),
        }
    }

    /// Score one transaction. Either a full verdict or an error, never a
    /// partial result.
    pub fn predict_one(&self, raw: &RawTransaction) -> Result<Verdict, InferenceError> {
        let vector = self.normalizer.normalize(raw);
        let probability = self.classifier.score(&vector)?;
        let verdict = self.policy.decide(probability);

        debug!(
            fields = raw.len(),
            probability = verdict.fraud_probability,
            risk_level = %verdict.risk_level,
            is_fraud = verdict.is_fraud,
            "Transaction scored"
        );

        Ok(verdict)
    }

    /// Score every record independently, keeping input order.
    ///
    /// With [`FailurePolicy::FailFast`] the first failing row (lowest index)
    /// aborts the batch. With [`FailurePolicy::BestEffort`] failing rows are
    /// marked and the summary covers the rows that scored.
    pub fn predict_batch(
        &self,
        records: &[RawTransaction],
        policy: FailurePolicy,
    ) -> Result<BatchOutcome, InferenceError> {
        let results: Vec<Result<Verdict, InferenceError>> = if self.parallel_batches {
            records.par_iter().map(|raw| self.predict_one(raw)).collect()
        } else {
            records.iter().map(|raw| self.predict_one(raw)).collect()
        };

        let mut scored = Vec::with_capacity(results.len());
        let mut failed = 0;

        for (index, result) in results.into_iter().enumerate() {
            let outcome = match result {
                Ok(verdict) => RecordOutcome::Scored(verdict),
                Err(e) => match policy {
                    FailurePolicy::FailFast => return Err(e.at_record(index)),
                    FailurePolicy::BestEffort => {
                        warn!(record = index, error = %e, "Batch record failed to score");
                        failed += 1;
                        RecordOutcome::Failed {
                            error: e.to_string(),
                        }
                    }
                },
            };
            scored.push(ScoredRecord {
                transaction_id: index,
                outcome,
            });
        }

        let summary = BatchSummary::from_verdicts(scored.iter().filter_map(ScoredRecord::verdict), failed);

        info!(
            total = summary.total_transactions,
            fraud_detected = summary.fraud_detected,
            failed = summary.failed,
            "Batch scored"
        );

        Ok(BatchOutcome {
            records: scored,
            summary,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::features::normalizer::FeatureVector;
    use crate::types::verdict::{RiskDistribution, RiskLevel};

    /// Returns the first feature as the probability; negative values fail.
    pub(crate) struct ScriptedClassifier {
        pub features: usize,
    }

    impl RiskClassifier for ScriptedClassifier {
        fn score(&self, vector: &FeatureVector) -> Result<f64, InferenceError> {
            let p = vector.get(0).unwrap_or(0.0) as f64;
            if p < 0.0 {
                Err(InferenceError::Classifier(format!("cannot score {}", p)))
            } else {
                Ok(p.min(1.0))
            }
        }

        fn feature_count(&self) -> usize {
            self.features
        }

        fn backend(&self) -> &'static str {
            "scripted"
        }
    }

    pub(crate) fn scripted_service() -> PredictionService {
        scripted_service_with(&["risk", "ProductCD", "card1"])
    }

    /// The first feature is read back as the probability.
    pub(crate) fn scripted_service_with(features: &[&str]) -> PredictionService {
        let schema = FeatureSchema::from_names(features, &HashSet::new()).unwrap();
        let normalizer = FeatureNormalizer::new(Arc::new(schema), Arc::new(PerRunEncoder));
        PredictionService::new(
            normalizer,
            Arc::new(ScriptedClassifier {
                features: features.len(),
            }),
            DecisionPolicy::new(0.6),
            ModelCard::default(),
        )
        .unwrap()
    }

    pub(crate) fn record(risk: f64) -> RawTransaction {
        RawTransaction::new()
            .with("risk", risk)
            .with("ProductCD", "W")
            .with("card1", 13926_i64)
    }

    #[test]
    fn test_predict_one() {
        let service = scripted_service();
        let verdict = service.predict_one(&record(0.65)).unwrap();

        assert!(verdict.is_fraud);
        assert_eq!(verdict.risk_level, RiskLevel::High);
        assert!((verdict.fraud_probability - 0.65).abs() < 1e-6);
    }

    #[test]
    fn test_predict_one_is_idempotent() {
        let service = scripted_service();
        let raw = record(0.42);
        assert_eq!(service.predict_one(&raw).unwrap(), service.predict_one(&raw).unwrap());
    }

    #[test]
    fn test_predict_one_surfaces_classifier_errors() {
        let service = scripted_service();
        assert!(service.predict_one(&record(-1.0)).is_err());
    }

    #[test]
    fn test_batch_summary_scenario() {
        let service = scripted_service();
        let records = vec![record(0.1), record(0.65), record(0.9)];

        let outcome = service.predict_batch(&records, FailurePolicy::FailFast).unwrap();

        assert_eq!(outcome.summary.total_transactions, 3);
        assert_eq!(outcome.summary.fraud_detected, 2);
        assert_eq!(
            outcome.summary.risk_distribution,
            RiskDistribution {
                low: 1,
                medium: 0,
                high: 1,
                critical: 1
            }
        );
        let ids: Vec<usize> = outcome.records.iter().map(|r| r.transaction_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_batch_fail_fast_reports_first_failing_row() {
        let service = scripted_service();
        let records = vec![record(0.1), record(-1.0), record(-2.0)];

        let err = service.predict_batch(&records, FailurePolicy::FailFast).unwrap_err();

        assert!(matches!(err, InferenceError::Record { index: 1, .. }));
    }

    #[test]
    fn test_batch_best_effort_marks_failures() {
        let service = scripted_service();
        let records = vec![record(0.9), record(-1.0), record(0.2)];

        let outcome = service.predict_batch(&records, FailurePolicy::BestEffort).unwrap();

        assert_eq!(outcome.records.len(), 3);
        assert!(outcome.records[1].verdict().is_none());
        assert_eq!(outcome.summary.total_transactions, 3);
        assert_eq!(outcome.summary.scored, 2);
        assert_eq!(outcome.summary.failed, 1);
        assert_eq!(outcome.summary.fraud_detected, 1);
        assert!((outcome.summary.fraud_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_parallel_and_sequential_agree() {
        let records: Vec<RawTransaction> = (0..50).map(|i| record(i as f64 / 50.0)).collect();

        let parallel = scripted_service()
            .predict_batch(&records, FailurePolicy::FailFast)
            .unwrap();
        let sequential = scripted_service()
            .with_parallel_batches(false)
            .predict_batch(&records, FailurePolicy::FailFast)
            .unwrap();

        let p: Vec<_> = parallel.records.iter().filter_map(ScoredRecord::verdict).collect();
        let s: Vec<_> = sequential.records.iter().filter_map(ScoredRecord::verdict).collect();
        assert_eq!(p, s);
    }

    #[test]
    fn test_scored_record_json_is_flat() {
        let service = scripted_service();
        let outcome = service
            .predict_batch(&[record(0.1), record(-1.0)], FailurePolicy::BestEffort)
            .unwrap();

        let json = serde_json::to_value(&outcome.records).unwrap();
        assert_eq!(json[0]["transaction_id"], 0);
        assert_eq!(json[0]["risk_level"], "Low");
        assert_eq!(json[0]["is_fraud"], false);
        assert_eq!(json[1]["transaction_id"], 1);
        assert!(json[1]["error"].is_string());
    }

    #[test]
    fn test_feature_count_mismatch_rejected() {
        let schema = FeatureSchema::from_names(["a", "b"], &HashSet::new()).unwrap();
        let normalizer = FeatureNormalizer::new(Arc::new(schema), Arc::new(PerRunEncoder));

        let result = PredictionService::new(
            normalizer,
            Arc::new(ScriptedClassifier { features: 5 }),
            DecisionPolicy::default(),
            ModelCard::default(),
        );

        assert!(matches!(
            result.err(),
            Some(ConfigError::Model(LoadError::FeatureCountMismatch { model: 5, schema: 2 }))
        ));
    }

    #[test]
    fn test_health_and_info() {
        let service = scripted_service();

        let health = service.health();
        assert!(health.model_loaded);
        assert_eq!(health.model_type, "XGBoost (Tuned)");

        let info = service.model_info();
        assert_eq!(info.model_type, "XGBoost Classifier");
        assert_eq!(info.features_count, 3);
        assert_eq!(info.optimal_threshold, 0.6);
        assert_eq!(info.backend, "scripted");
        assert_eq!(info.encoding, "per_run");
    }
}
