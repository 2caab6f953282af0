//! Scoring verdicts and batch summaries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Risk band classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Lower bound of the Medium band.
    pub const MEDIUM_FROM: f64 = 0.3;
    /// Lower bound of the High band.
    pub const HIGH_FROM: f64 = 0.6;
    /// Lower bound of the Critical band.
    pub const CRITICAL_FROM: f64 = 0.8;

    /// Map a fraud probability onto the fixed risk bands.
    ///
    /// The bands do not depend on the decision threshold.
    pub fn from_probability(probability: f64) -> Self {
        if probability >= Self::CRITICAL_FROM {
            RiskLevel::Critical
        } else if probability >= Self::HIGH_FROM {
            RiskLevel::High
        } else if probability >= Self::MEDIUM_FROM {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
            RiskLevel::Critical => "Critical",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of scoring one transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// Whether the probability reached the decision threshold
    pub is_fraud: bool,

    /// Fraud probability (0.0 - 1.0)
    pub fraud_probability: f64,

    /// Risk band of the probability
    pub risk_level: RiskLevel,

    /// Human-readable result
    pub message: String,
}

/// Per-band verdict counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskDistribution {
    #[serde(rename = "Low")]
    pub low: usize,
    #[serde(rename = "Medium")]
    pub medium: usize,
    #[serde(rename = "High")]
    pub high: usize,
    #[serde(rename = "Critical")]
    pub critical: usize,
}

impl RiskDistribution {
    pub fn record(&mut self, level: RiskLevel) {
        match level {
            RiskLevel::Low => self.low += 1,
            RiskLevel::Medium => self.medium += 1,
            RiskLevel::High => self.high += 1,
            RiskLevel::Critical => self.critical += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.low + self.medium + self.high + self.critical
    }
}

/// Aggregate statistics over one batch of verdicts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Records submitted, scored or not
    pub total_transactions: usize,

    /// Records that produced a verdict
    pub scored: usize,

    /// Records that failed to score
    pub failed: usize,

    /// Verdicts flagged as fraud
    pub fraud_detected: usize,

    /// `fraud_detected / scored`, 0 when nothing was scored
    pub fraud_rate: f64,

    /// Mean fraud probability over scored records
    pub average_fraud_probability: f64,

    pub risk_distribution: RiskDistribution,

    /// Summary generation time
    pub timestamp: DateTime<Utc>,
}

impl BatchSummary {
    /// Fold scored verdicts into a summary. `failed` counts records that
    /// produced no verdict and only contributes to `total_transactions`.
    pub fn from_verdicts<'a, I>(verdicts: I, failed: usize) -> Self
    where
        I: IntoIterator<Item = &'a Verdict>,
    {
        let mut scored = 0;
        let mut fraud_detected = 0;
        let mut probability_sum = 0.0;
        let mut risk_distribution = RiskDistribution::default();

        for verdict in verdicts {
            scored += 1;
            if verdict.is_fraud {
                fraud_detected += 1;
            }
            probability_sum += verdict.fraud_probability;
            risk_distribution.record(verdict.risk_level);
        }

        let (fraud_rate, average_fraud_probability) = if scored > 0 {
            (
                fraud_detected as f64 / scored as f64,
                probability_sum / scored as f64,
            )
        } else {
            (0.0, 0.0)
        };

        Self {
            total_transactions: scored + failed,
            scored,
            failed,
            fraud_detected,
            fraud_rate,
            average_fraud_probability,
            risk_distribution,
            timestamp: Utc::now(),
        }
    }
}
