//! Categorical encoding strategies.
//!
//! `PerRunEncoder` enumerates the distinct values seen in the current
//! normalization run (sorted, code = position). Codes therefore depend on what
//! else is in the run and are not stable across calls. `VocabularyEncoder`
//! looks values up in a mapping persisted at training time and is stable.

use crate::error::ConfigError;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use tracing::info;

/// Text substituted for absent categorical values before encoding.
pub const UNKNOWN_CATEGORY: &str = "unknown";

/// Code assigned to values a persisted vocabulary has never seen.
pub const UNSEEN_CODE: f64 = -1.0;

/// Maps the textual values of one field, within one normalization run, to
/// integer codes.
pub trait CategoricalEncoder: Send + Sync {
    /// Encode `values` (one per record in the run) for `field`. Returns one
    /// code per input value, in input order.
    fn encode_column(&self, field: &str, values: &[&str]) -> Vec<f64>;

    /// Strategy name for logs and model info.
    fn name(&self) -> &'static str;
}

/// Per-run label encoding: distinct values are sorted and numbered from 0.
#[derive(Debug, Default, Clone, Copy)]
pub struct PerRunEncoder;

impl CategoricalEncoder for PerRunEncoder {
    fn encode_column(&self, _field: &str, values: &[&str]) -> Vec<f64> {
        let categories: BTreeSet<&str> = values.iter().copied().collect();
        let codes: HashMap<&str, usize> = categories
            .into_iter()
            .enumerate()
            .map(|(code, value)| (value, code))
            .collect();

        values.iter().map(|v| codes[v] as f64).collect()
    }

    fn name(&self) -> &'static str {
        "per_run"
    }
}

/// Label encoding from a vocabulary persisted alongside the model.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct VocabularyEncoder {
    fields: HashMap<String, HashMap<String, i64>>,
}

impl VocabularyEncoder {
    pub fn new(fields: HashMap<String, HashMap<String, i64>>) -> Self {
        Self { fields }
    }

    /// Load a `{field: {value: code}}` JSON vocabulary.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let vocabulary_err = |reason: String| ConfigError::Vocabulary {
            path: path.to_path_buf(),
            reason,
        };

        let contents = std::fs::read_to_string(path).map_err(|e| vocabulary_err(e.to_string()))?;
        let encoder: Self =
            serde_json::from_str(&contents).map_err(|e| vocabulary_err(e.to_string()))?;

        if encoder.fields.is_empty() {
            return Err(vocabulary_err("vocabulary has no fields".to_string()));
        }

        info!(
            path = %path.display(),
            fields = encoder.fields.len(),
            "Category vocabulary loaded"
        );
        Ok(encoder)
    }

    /// Fields covered by the vocabulary.
    pub fn field_names(&self) -> HashSet<String> {
        self.fields.keys().cloned().collect()
    }
}

impl CategoricalEncoder for VocabularyEncoder {
    fn encode_column(&self, field: &str, values: &[&str]) -> Vec<f64> {
        let mapping = self.fields.get(field);
        values
            .iter()
            .map(|value| {
                mapping
                    .and_then(|m| m.get(*value))
                    .map(|&code| code as f64)
                    .unwrap_or(UNSEEN_CODE)
            })
            .collect()
    }

    fn name(&self) -> &'static str {
        "vocabulary"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_per_run_sorted_codes() {
        let codes = PerRunEncoder.encode_column("card4", &["visa", "discover", "visa", "amex"]);
        assert_eq!(codes, vec![2.0, 1.0, 2.0, 0.0]);
    }

    #[test]
    fn test_per_run_single_value_is_zero() {
        assert_eq!(PerRunEncoder.encode_column("ProductCD", &["W"]), vec![0.0]);
        assert_eq!(PerRunEncoder.encode_column("ProductCD", &["C"]), vec![0.0]);
    }

    #[test]
    fn test_per_run_codes_depend_on_run() {
        // Same value, different neighbours, different code.
        let first = PerRunEncoder.encode_column("card6", &["debit", "credit"]);
        let second = PerRunEncoder.encode_column("card6", &["debit", "zzz"]);
        assert_eq!(first[0], 1.0);
        assert_eq!(second[0], 0.0);
    }

    #[test]
    fn test_vocabulary_lookup_and_unseen() {
        let mut card4 = HashMap::new();
        card4.insert("visa".to_string(), 3);
        card4.insert("unknown".to_string(), 0);
        let mut fields = HashMap::new();
        fields.insert("card4".to_string(), card4);
        let encoder = VocabularyEncoder::new(fields);

        assert_eq!(
            encoder.encode_column("card4", &["visa", "unknown", "mastercard"]),
            vec![3.0, 0.0, UNSEEN_CODE]
        );
        assert_eq!(encoder.encode_column("card6", &["debit"]), vec![UNSEEN_CODE]);
    }

    #[test]
    fn test_vocabulary_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{"ProductCD": {"C": 0, "H": 1, "W": 4}}"#)
            .unwrap();

        let encoder = VocabularyEncoder::load(file.path()).unwrap();

        assert_eq!(encoder.encode_column("ProductCD", &["W"]), vec![4.0]);
        assert!(encoder.field_names().contains("ProductCD"));
    }

    #[test]
    fn test_vocabulary_load_rejects_garbage() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"not json").unwrap();

        let err = VocabularyEncoder::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Vocabulary { .. }));
    }
}
