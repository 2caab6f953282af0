//! Type definitions for the scoring service

pub mod transaction;
pub mod verdict;

pub use transaction::{RawTransaction, RawValue};
pub use verdict::{BatchSummary, RiskDistribution, RiskLevel, Verdict};
