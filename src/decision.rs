//! Decision policy: probability to fraud flag, risk band and message

use crate::types::verdict::{RiskLevel, Verdict};
use serde::Serialize;

/// Default probability cutoff for flagging a transaction.
pub const DEFAULT_THRESHOLD: f64 = 0.6;

/// Turns a fraud probability into a verdict.
///
/// The fraud flag uses the configured threshold while the risk band uses the
/// fixed bands of [`RiskLevel::from_probability`]. The two are independent:
/// a lowered threshold can flag a Medium-band transaction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DecisionPolicy {
    threshold: f64,
}

impl DecisionPolicy {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn decide(&self, probability: f64) -> Verdict {
        decide(probability, self.threshold)
    }
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

/// `is_fraud` iff `probability >= threshold`.
pub fn decide(probability: f64, threshold: f64) -> Verdict {
    let is_fraud = probability >= threshold;
    let risk_level = RiskLevel::from_probability(probability);

    let percent = probability * 100.0;
    let message = if is_fraud {
        format!("⚠️ Transaction flagged as FRAUD (confidence: {:.1}%)", percent)
    } else {
        format!("✓ Transaction appears legitimate (fraud risk: {:.1}%)", percent)
    };

    Verdict {
        is_fraud,
        fraud_probability: probability,
        risk_level,
        message,
    }
}
