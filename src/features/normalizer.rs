//! Feature normalization for fraud model inference.
//!
//! Turns one raw, possibly incomplete transaction into the fixed-order numeric
//! vector the classifier was trained on. The pipeline runs six steps in order:
//! amount features, email features, categorical encoding, numeric gap-fill,
//! schema completion and projection. No step fails: every gap resolves to
//! [`MISSING_SENTINEL`].

use crate::features::encoding::{CategoricalEncoder, UNKNOWN_CATEGORY};
use crate::features::schema::{FeatureKind, FeatureSchema};
use crate::types::transaction::{RawTransaction, RawValue};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Value marking "was missing" in the feature vector.
pub const MISSING_SENTINEL: f32 = -999.0;

pub const AMOUNT_FIELD: &str = "TransactionAmt";
pub const PURCHASER_EMAIL_FIELD: &str = "P_emaildomain";
pub const RECIPIENT_EMAIL_FIELD: &str = "R_emaildomain";

/// Consumer email providers used for the `*_email_is_common` flags.
pub const COMMON_EMAIL_PROVIDERS: [&str; 5] = [
    "gmail.com",
    "yahoo.com",
    "hotmail.com",
    "outlook.com",
    "aol.com",
];

/// Working set of named values while a record moves through the steps.
pub type Frame = BTreeMap<String, RawValue>;

/// Fixed-length numeric input for the classifier, one value per schema entry.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    values: Vec<f32>,
}

impl FeatureVector {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<f32> {
        self.values.get(index).copied()
    }
}

/// Transforms raw transactions into model input vectors.
///
/// Pure and deterministic for a given schema and encoder; safe to share
/// across threads.
#[derive(Clone)]
pub struct FeatureNormalizer {
    schema: Arc<FeatureSchema>,
    encoder: Arc<dyn CategoricalEncoder>,
}

impl FeatureNormalizer {
    pub fn new(schema: Arc<FeatureSchema>, encoder: Arc<dyn CategoricalEncoder>) -> Self {
        Self { schema, encoder }
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Number of features produced.
    pub fn feature_count(&self) -> usize {
        self.schema.len()
    }

    pub fn encoding_strategy(&self) -> &'static str {
        self.encoder.name()
    }

    /// Normalize one record. Each call is its own encoding run.
    pub fn normalize(&self, raw: &RawTransaction) -> FeatureVector {
        let mut frame: Frame = raw.fields().clone();

        add_amount_features(&mut frame);
        add_email_features(&mut frame);
        encode_categoricals(&mut frame, &self.schema, self.encoder.as_ref());
        fill_numeric_gaps(&mut frame);
        complete_schema(&mut frame, &self.schema);

        project(&frame, &self.schema)
    }
}

impl std::fmt::Debug for FeatureNormalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureNormalizer")
            .field("features", &self.schema.len())
            .field("encoder", &self.encoder.name())
            .finish()
    }
}

/// Step 1: log1p, fractional part and multiple-of-ten flag of the amount.
///
/// Only runs when the amount field is present. A non-numeric or missing
/// amount leaves the derived features missing.
pub fn add_amount_features(frame: &mut Frame) {
    let amount = match frame.get(AMOUNT_FIELD) {
        Some(value) => value.as_number(),
        None => return,
    };

    let (log, decimal, is_round) = match amount {
        Some(amt) => (
            RawValue::Number(amt.ln_1p()),
            RawValue::Number(amt - amt.trunc()),
            RawValue::Number(flag(amt % 10.0 == 0.0)),
        ),
        None => (RawValue::Missing, RawValue::Missing, RawValue::Missing),
    };

    frame.insert("TransactionAmt_log".to_string(), log);
    frame.insert("TransactionAmt_decimal".to_string(), decimal);
    frame.insert("is_round_amount".to_string(), is_round);
}

/// Step 2: email domain match, common-provider and presence flags.
///
/// Only runs when both domain fields are present. Missing domains are
/// replaced with "unknown" in the frame before any comparison.
pub fn add_email_features(frame: &mut Frame) {
    if !frame.contains_key(PURCHASER_EMAIL_FIELD) || !frame.contains_key(RECIPIENT_EMAIL_FIELD) {
        return;
    }

    let purchaser = email_domain(frame, PURCHASER_EMAIL_FIELD);
    let recipient = email_domain(frame, RECIPIENT_EMAIL_FIELD);

    let derived = [
        ("email_domain_match", purchaser == recipient),
        ("P_email_is_common", is_common_provider(&purchaser)),
        ("R_email_is_common", is_common_provider(&recipient)),
        ("has_P_email", purchaser != UNKNOWN_CATEGORY),
        ("has_R_email", recipient != UNKNOWN_CATEGORY),
    ];
    for (name, value) in derived {
        frame.insert(name.to_string(), RawValue::Number(flag(value)));
    }

    frame.insert(PURCHASER_EMAIL_FIELD.to_string(), RawValue::Text(purchaser));
    frame.insert(RECIPIENT_EMAIL_FIELD.to_string(), RawValue::Text(recipient));
}

/// Step 3: replace textual values with integer codes.
///
/// Every textual field is encoded. A missing value in a field the schema tags
/// categorical is encoded as "unknown".
pub fn encode_categoricals(frame: &mut Frame, schema: &FeatureSchema, encoder: &dyn CategoricalEncoder) {
    for (field, value) in frame.iter_mut() {
        let text = if let RawValue::Text(s) = value {
            s.clone()
        } else if value.is_missing() && schema.kind_of(field) == Some(FeatureKind::Categorical) {
            UNKNOWN_CATEGORY.to_string()
        } else {
            continue;
        };

        let code = encoder
            .encode_column(field, &[text.as_str()])
            .first()
            .copied()
            .unwrap_or(MISSING_SENTINEL as f64);
        *value = RawValue::Number(code);
    }
}

/// Step 4: every remaining missing value becomes the sentinel.
pub fn fill_numeric_gaps(frame: &mut Frame) {
    for value in frame.values_mut() {
        if value.is_missing() {
            *value = RawValue::Number(MISSING_SENTINEL as f64);
        }
    }
}

/// Step 5: add schema features the record never had.
pub fn complete_schema(frame: &mut Frame, schema: &FeatureSchema) {
    for name in schema.names() {
        frame
            .entry(name.to_string())
            .or_insert(RawValue::Number(MISSING_SENTINEL as f64));
    }
}

/// Step 6: read exactly the schema features, in schema order.
pub fn project(frame: &Frame, schema: &FeatureSchema) -> FeatureVector {
    let values = schema
        .names()
        .map(|name| {
            frame
                .get(name)
                .and_then(RawValue::as_number)
                .map(|v| v as f32)
                .unwrap_or(MISSING_SENTINEL)
        })
        .collect();
    FeatureVector::new(values)
}

fn email_domain(frame: &Frame, field: &str) -> String {
    match frame.get(field) {
        Some(RawValue::Text(s)) => s.clone(),
        Some(RawValue::Number(n)) if !n.is_nan() => n.to_string(),
        _ => UNKNOWN_CATEGORY.to_string(),
    }
}

fn is_common_provider(domain: &str) -> bool {
    COMMON_EMAIL_PROVIDERS.contains(&domain)
}

fn flag(condition: bool) -> f64 {
    if condition {
        1.0
    } else {
        0.0
    }
}
