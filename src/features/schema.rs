//! Feature schema: ordered feature names with a static kind tag.
//!
//! Loaded once at startup from the training feature list. Kinds are decided at
//! load so that normalization never sniffs value types to decide how a gap is
//! filled.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

/// Features computed by the normalizer rather than read from the record.
pub const DERIVED_FEATURES: [&str; 8] = [
    "TransactionAmt_log",
    "TransactionAmt_decimal",
    "is_round_amount",
    "email_domain_match",
    "P_email_is_common",
    "R_email_is_common",
    "has_P_email",
    "has_R_email",
];

/// Textual transaction fields known from the training data.
pub const KNOWN_CATEGORICAL: [&str; 16] = [
    "ProductCD",
    "card4",
    "card6",
    "P_emaildomain",
    "R_emaildomain",
    "M1",
    "M2",
    "M3",
    "M4",
    "M5",
    "M6",
    "M7",
    "M8",
    "M9",
    "DeviceType",
    "DeviceInfo",
];

/// How a feature is produced and how its gaps are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    /// Read as a number; gaps become the sentinel.
    Numeric,
    /// Text encoded to an integer code; null values encode as "unknown".
    Categorical,
    /// Computed from other fields; gaps become the sentinel.
    Derived,
}

impl FeatureKind {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "numeric" => Some(FeatureKind::Numeric),
            "categorical" => Some(FeatureKind::Categorical),
            "derived" => Some(FeatureKind::Derived),
            _ => None,
        }
    }
}

/// One schema entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub name: String,
    pub kind: FeatureKind,
}

/// Ordered feature list the classifier was trained on.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSchema {
    features: Vec<FeatureSpec>,
}

impl FeatureSchema {
    /// Build a schema from explicit specs. An empty list is a configuration error.
    pub fn new(features: Vec<FeatureSpec>) -> Result<Self, ConfigError> {
        if features.is_empty() {
            return Err(ConfigError::EmptySchema {
                path: "<inline>".into(),
            });
        }
        Ok(Self { features })
    }

    /// Build a schema from names alone, inferring each kind.
    pub fn from_names<I, S>(names: I, extra_categorical: &HashSet<String>) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let features = names
            .into_iter()
            .map(|name| {
                let name = name.as_ref().to_string();
                let kind = infer_kind(&name, extra_categorical);
                FeatureSpec { name, kind }
            })
            .collect();
        Self::new(features)
    }

    /// Load the feature list written at training time.
    ///
    /// The file is a CSV with a `feature` column and an optional `kind`
    /// column. Fields named in `extra_categorical` (typically the keys of a
    /// persisted category vocabulary) are tagged categorical when no kind is
    /// given.
    pub fn load<P: AsRef<Path>>(
        path: P,
        extra_categorical: &HashSet<String>,
    ) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let feature_list_err = |source| ConfigError::FeatureList {
            path: path.to_path_buf(),
            source,
        };

        let mut reader = csv::Reader::from_path(path).map_err(feature_list_err)?;
        let headers = reader.headers().map_err(feature_list_err)?.clone();

        let feature_col = headers
            .iter()
            .position(|h| h.trim() == "feature")
            .ok_or_else(|| ConfigError::FeatureColumnMissing {
                path: path.to_path_buf(),
            })?;
        let kind_col = headers.iter().position(|h| h.trim() == "kind");

        let mut features = Vec::new();
        for record in reader.records() {
            let record = record.map_err(feature_list_err)?;
            let name = match record.get(feature_col).map(str::trim) {
                Some(name) if !name.is_empty() => name.to_string(),
                _ => continue,
            };

            let kind = match kind_col.and_then(|i| record.get(i)).map(str::trim) {
                Some(raw) if !raw.is_empty() => {
                    FeatureKind::parse(raw).ok_or_else(|| ConfigError::UnknownFeatureKind {
                        path: path.to_path_buf(),
                        feature: name.clone(),
                        kind: raw.to_string(),
                    })?
                }
                _ => infer_kind(&name, extra_categorical),
            };

            features.push(FeatureSpec { name, kind });
        }

        if features.is_empty() {
            return Err(ConfigError::EmptySchema {
                path: path.to_path_buf(),
            });
        }

        let schema = Self { features };
        info!(
            path = %path.display(),
            features = schema.len(),
            categorical = schema.count_kind(FeatureKind::Categorical),
            derived = schema.count_kind(FeatureKind::Derived),
            "Feature schema loaded"
        );
        Ok(schema)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn features(&self) -> &[FeatureSpec] {
        &self.features
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.features.iter().map(|f| f.name.as_str())
    }

    /// Position of a feature by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.features.iter().position(|f| f.name == name)
    }

    pub fn kind_of(&self, name: &str) -> Option<FeatureKind> {
        self.features.iter().find(|f| f.name == name).map(|f| f.kind)
    }

    fn count_kind(&self, kind: FeatureKind) -> usize {
        self.features.iter().filter(|f| f.kind == kind).count()
    }
}

fn infer_kind(name: &str, extra_categorical: &HashSet<String>) -> FeatureKind {
    if DERIVED_FEATURES.contains(&name) {
        FeatureKind::Derived
    } else if KNOWN_CATEGORICAL.contains(&name) || extra_categorical.contains(name) {
        FeatureKind::Categorical
    } else {
        FeatureKind::Numeric
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_list(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_infers_kinds() {
        let file = write_list("feature\nTransactionAmt\nProductCD\ncard1\nTransactionAmt_log\nemail_domain_match\n");

        let schema = FeatureSchema::load(file.path(), &HashSet::new()).unwrap();

        assert_eq!(schema.len(), 5);
        assert_eq!(schema.kind_of("TransactionAmt"), Some(FeatureKind::Numeric));
        assert_eq!(schema.kind_of("ProductCD"), Some(FeatureKind::Categorical));
        assert_eq!(schema.kind_of("card1"), Some(FeatureKind::Numeric));
        assert_eq!(schema.kind_of("TransactionAmt_log"), Some(FeatureKind::Derived));
        assert_eq!(schema.kind_of("email_domain_match"), Some(FeatureKind::Derived));
        assert_eq!(
            schema.names().collect::<Vec<_>>(),
            vec!["TransactionAmt", "ProductCD", "card1", "TransactionAmt_log", "email_domain_match"]
        );
    }

    #[test]
    fn test_load_explicit_kind_column() {
        let file = write_list("feature,kind\nid_30,categorical\ncard1,numeric\nProductCD,\n");

        let schema = FeatureSchema::load(file.path(), &HashSet::new()).unwrap();

        assert_eq!(schema.kind_of("id_30"), Some(FeatureKind::Categorical));
        assert_eq!(schema.kind_of("card1"), Some(FeatureKind::Numeric));
        assert_eq!(schema.kind_of("ProductCD"), Some(FeatureKind::Categorical));
    }

    #[test]
    fn test_vocabulary_fields_become_categorical() {
        let extra: HashSet<String> = ["id_31".to_string()].into_iter().collect();
        let schema = FeatureSchema::from_names(["id_31", "id_32"], &extra).unwrap();

        assert_eq!(schema.kind_of("id_31"), Some(FeatureKind::Categorical));
        assert_eq!(schema.kind_of("id_32"), Some(FeatureKind::Numeric));
    }

    #[test]
    fn test_empty_list_is_config_error() {
        let file = write_list("feature\n");
        let err = FeatureSchema::load(file.path(), &HashSet::new()).unwrap_err();
        assert!(matches!(err, ConfigError::EmptySchema { .. }));

        let err = FeatureSchema::from_names(Vec::<String>::new(), &HashSet::new()).unwrap_err();
        assert!(matches!(err, ConfigError::EmptySchema { .. }));
    }

    #[test]
    fn test_missing_feature_column() {
        let file = write_list("name\ncard1\n");
        let err = FeatureSchema::load(file.path(), &HashSet::new()).unwrap_err();
        assert!(matches!(err, ConfigError::FeatureColumnMissing { .. }));
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let file = write_list("feature,kind\ncard1,ordinal\n");
        let err = FeatureSchema::load(file.path(), &HashSet::new()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownFeatureKind { .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = FeatureSchema::load("does/not/exist.csv", &HashSet::new()).unwrap_err();
        assert!(matches!(err, ConfigError::FeatureList { .. }));
    }
}
