//! Raw transaction records as received from callers

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single raw field value. Fields may be numeric, textual or absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged, from = "WireValue")]
pub enum RawValue {
    Number(f64),
    Text(String),
    Missing,
}

/// JSON shapes accepted for a field before collapsing into `RawValue`.
#[derive(Deserialize)]
#[serde(untagged)]
enum WireValue {
    Number(f64),
    Flag(bool),
    Text(String),
    Null(Option<()>),
}

impl From<WireValue> for RawValue {
    fn from(value: WireValue) -> Self {
        match value {
            WireValue::Number(n) => RawValue::Number(n),
            WireValue::Flag(b) => RawValue::Number(if b { 1.0 } else { 0.0 }),
            WireValue::Text(s) => RawValue::Text(s),
            WireValue::Null(_) => RawValue::Missing,
        }
    }
}

impl RawValue {
    /// Numeric value, if this is a present, non-NaN number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            RawValue::Number(n) if !n.is_nan() => Some(*n),
            _ => None,
        }
    }

    /// Whether the value should be treated as absent.
    pub fn is_missing(&self) -> bool {
        match self {
            RawValue::Missing => true,
            RawValue::Number(n) => n.is_nan(),
            RawValue::Text(_) => false,
        }
    }
}

impl From<f64> for RawValue {
    fn from(n: f64) -> Self {
        RawValue::Number(n)
    }
}

impl From<i64> for RawValue {
    fn from(n: i64) -> Self {
        RawValue::Number(n as f64)
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Text(s.to_string())
    }
}

impl<T: Into<RawValue>> From<Option<T>> for RawValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(RawValue::Missing)
    }
}

/// An open mapping of field name to raw value.
///
/// Unknown fields are carried along and ignored at projection time; expected
/// fields that are absent are treated as missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawTransaction {
    fields: BTreeMap<String, RawValue>,
}

impl RawTransaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, field: &str, value: impl Into<RawValue>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: &str, value: impl Into<RawValue>) {
        self.fields.insert(field.to_string(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&RawValue> {
        self.fields.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &BTreeMap<String, RawValue> {
        &self.fields
    }
}

impl FromIterator<(String, RawValue)> for RawTransaction {
    fn from_iter<I: IntoIterator<Item = (String, RawValue)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_deserialization() {
        let json = r#"{
            "TransactionAmt": 150.5,
            "ProductCD": "W",
            "card1": 13926,
            "card2": null,
            "is_mobile": true
        }"#;

        let tx: RawTransaction = serde_json::from_str(json).unwrap();

        assert_eq!(tx.len(), 5);
        assert_eq!(tx.get("TransactionAmt"), Some(&RawValue::Number(150.5)));
        assert_eq!(tx.get("ProductCD"), Some(&RawValue::Text("W".to_string())));
        assert_eq!(tx.get("card1"), Some(&RawValue::Number(13926.0)));
        assert_eq!(tx.get("card2"), Some(&RawValue::Missing));
        assert_eq!(tx.get("is_mobile"), Some(&RawValue::Number(1.0)));
        assert!(tx.get("card3").is_none());
    }

    #[test]
    fn test_nan_is_missing() {
        assert!(RawValue::Number(f64::NAN).is_missing());
        assert_eq!(RawValue::Number(f64::NAN).as_number(), None);
        assert!(!RawValue::Text(String::new()).is_missing());
    }

    #[test]
    fn test_builder_accepts_optionals() {
        let tx = RawTransaction::new()
            .with("P_emaildomain", Some("gmail.com"))
            .with("R_emaildomain", None::<&str>);

        assert_eq!(tx.get("R_emaildomain"), Some(&RawValue::Missing));
        assert!(tx.contains("P_emaildomain"));
    }
}
