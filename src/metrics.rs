//! Serving metrics: prediction counts, latency percentiles and score
//! distribution for the scoring API.

use crate::types::verdict::{RiskDistribution, Verdict};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

const LATENCY_WINDOW: usize = 10_000;

/// Metrics collector shared by all request handlers
pub struct ServiceMetrics {
    /// Verdicts produced (single and batch)
    pub predictions: AtomicU64,
    /// Verdicts flagged as fraud
    pub flagged: AtomicU64,
    /// Records or requests that failed to score
    pub failures: AtomicU64,
    /// Rejected caller input
    pub rejected: AtomicU64,
    /// Batch requests served
    pub batches: AtomicU64,
    by_level: RwLock<RiskDistribution>,
    /// Request latencies (in microseconds)
    latencies: RwLock<Vec<u64>>,
    /// Fraud probability buckets of width 0.1
    score_buckets: RwLock<[u64; 10]>,
    start_time: Instant,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            predictions: AtomicU64::new(0),
            flagged: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            batches: AtomicU64::new(0),
            by_level: RwLock::new(RiskDistribution::default()),
            latencies: RwLock::new(Vec::with_capacity(1000)),
            score_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record one verdict
    pub fn record_verdict(&self, verdict: &Verdict) {
        self.predictions.fetch_add(1, Ordering::Relaxed);
        if verdict.is_fraud {
            self.flagged.fetch_add(1, Ordering::Relaxed);
        }

        if let Ok(mut by_level) = self.by_level.write() {
            by_level.record(verdict.risk_level);
        }

        let bucket = (verdict.fraud_probability * 10.0).clamp(0.0, 9.0) as usize;
        if let Ok(mut buckets) = self.score_buckets.write() {
            buckets[bucket] += 1;
        }
    }

    /// Record a served request and how long it took
    pub fn record_latency(&self, elapsed: Duration) {
        if let Ok(mut times) = self.latencies.write() {
            times.push(elapsed.as_micros() as u64);
            // Keep only the most recent window
            if times.len() > LATENCY_WINDOW {
                times.drain(0..LATENCY_WINDOW / 2);
            }
        }
    }

    pub fn record_batch(&self) {
        self.batches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failures(&self, count: u64) {
        self.failures.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_rejection(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Latency percentiles over the retained window
    pub fn latency_stats(&self) -> LatencyStats {
        let mut sorted = match self.latencies.read() {
            Ok(times) if !times.is_empty() => times.clone(),
            _ => return LatencyStats::default(),
        };
        sorted.sort_unstable();

        let count = sorted.len();
        let sum: u64 = sorted.iter().sum();
        let at = |q: f64| sorted[((count as f64 * q) as usize).min(count - 1)];

        LatencyStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: at(0.5),
            p95_us: at(0.95),
            p99_us: at(0.99),
            max_us: sorted[count - 1],
        }
    }

    /// Verdicts per second since startup
    pub fn throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.predictions.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let predictions = self.predictions.load(Ordering::Relaxed);
        let flagged = self.flagged.load(Ordering::Relaxed);

        MetricsSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),
            predictions,
            flagged,
            flag_rate: if predictions > 0 {
                flagged as f64 / predictions as f64
            } else {
                0.0
            },
            failures: self.failures.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            throughput: self.throughput(),
            risk_distribution: self.by_level.read().map(|d| *d).unwrap_or_default(),
            score_distribution: self.score_buckets.read().map(|b| *b).unwrap_or_default(),
            latency: self.latency_stats(),
        }
    }

    /// Log a summary of serving activity
    pub fn log_summary(&self) {
        let snapshot = self.snapshot();
        let levels = snapshot.risk_distribution;

        info!(
            predictions = snapshot.predictions,
            flagged = snapshot.flagged,
            flag_rate = format!("{:.1}%", snapshot.flag_rate * 100.0),
            failures = snapshot.failures,
            rejected = snapshot.rejected,
            batches = snapshot.batches,
            throughput = format!("{:.1} tx/s", snapshot.throughput),
            "Serving summary"
        );
        info!(
            low = levels.low,
            medium = levels.medium,
            high = levels.high,
            critical = levels.critical,
            "Verdicts by risk level"
        );
        info!(
            mean_us = snapshot.latency.mean_us,
            p50_us = snapshot.latency.p50_us,
            p95_us = snapshot.latency.p95_us,
            p99_us = snapshot.latency.p99_us,
            "Request latency"
        );
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Request latency statistics
#[derive(Debug, Default, Clone, Serialize)]
pub struct LatencyStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Point-in-time view served by the metrics endpoint
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub predictions: u64,
    pub flagged: u64,
    pub flag_rate: f64,
    pub failures: u64,
    pub rejected: u64,
    pub batches: u64,
    pub throughput: f64,
    pub risk_distribution: RiskDistribution,
    pub score_distribution: [u64; 10],
    pub latency: LatencyStats,
}

/// Logs a serving summary on a fixed interval
pub struct MetricsReporter {
    metrics: Arc<ServiceMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<ServiceMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Run until the task is dropped. An interval of 0 returns immediately.
    pub async fn start(self) {
        if self.interval_secs == 0 {
            return;
        }

        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        // The first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.log_summary();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::decide;

    #[test]
    fn test_metrics_recording() {
        let metrics = ServiceMetrics::new();

        metrics.record_verdict(&decide(0.1, 0.6));
        metrics.record_verdict(&decide(0.65, 0.6));
        metrics.record_verdict(&decide(0.95, 0.6));
        metrics.record_failures(2);
        metrics.record_rejection();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.predictions, 3);
        assert_eq!(snapshot.flagged, 2);
        assert_eq!(snapshot.failures, 2);
        assert_eq!(snapshot.rejected, 1);
        assert_eq!(snapshot.risk_distribution.low, 1);
        assert_eq!(snapshot.risk_distribution.high, 1);
        assert_eq!(snapshot.risk_distribution.critical, 1);
        assert_eq!(snapshot.score_distribution[1], 1);
        assert_eq!(snapshot.score_distribution[6], 1);
        assert_eq!(snapshot.score_distribution[9], 1);
    }

    #[test]
    fn test_certain_fraud_lands_in_last_bucket() {
        let metrics = ServiceMetrics::new();
        metrics.record_verdict(&decide(1.0, 0.6));
        assert_eq!(metrics.snapshot().score_distribution[9], 1);
    }

    #[test]
    fn test_latency_stats() {
        let metrics = ServiceMetrics::new();
        assert_eq!(metrics.latency_stats().count, 0);

        for us in 1..=100 {
            metrics.record_latency(Duration::from_micros(us));
        }

        let stats = metrics.latency_stats();
        assert_eq!(stats.count, 100);
        assert_eq!(stats.max_us, 100);
        assert_eq!(stats.p50_us, 51);
        assert_eq!(stats.p99_us, 100);
    }

    #[test]
    fn test_latency_window_is_bounded() {
        let metrics = ServiceMetrics::new();
        for _ in 0..(LATENCY_WINDOW + 1) {
            metrics.record_latency(Duration::from_micros(5));
        }
        assert!(metrics.latency_stats().count as usize <= LATENCY_WINDOW);
    }

    #[tokio::test]
    async fn test_reporter_disabled_returns() {
        let reporter = MetricsReporter::new(Arc::new(ServiceMetrics::new()), 0);
        reporter.start().await;
    }
}
