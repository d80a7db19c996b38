//! Shared run accumulation: request counters and latency percentiles.
//!
//! One [`RunRecorder`] is shared by all workers. Counters are atomic and
//! commutative, so accumulation order across workers is irrelevant; the
//! latency histogram sits behind a mutex that is touched once per request.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use hdrhistogram::Histogram;
use tracing::warn;

use crate::errors::ErrorCategory;
use crate::executor::ResultResponse;

/// Percentile statistics for the recorded latencies, in microseconds.
#[derive(Debug, Clone)]
pub struct PercentileStats {
    pub count: u64,
    pub min: u64,
    pub max: u64,
    pub mean: f64,
    pub p50: u64,
    pub p90: u64,
    pub p95: u64,
    pub p99: u64,
    pub p99_9: u64,
}

impl PercentileStats {
    /// Format statistics as a human-readable string.
    pub fn format(&self) -> String {
        format!(
            "count={}, min={:.2}ms, max={:.2}ms, mean={:.2}ms, p50={:.2}ms, p90={:.2}ms, p95={:.2}ms, p99={:.2}ms, p99.9={:.2}ms",
            self.count,
            self.min as f64 / 1000.0,
            self.max as f64 / 1000.0,
            self.mean / 1000.0,
            self.p50 as f64 / 1000.0,
            self.p90 as f64 / 1000.0,
            self.p95 as f64 / 1000.0,
            self.p99 as f64 / 1000.0,
            self.p99_9 as f64 / 1000.0,
        )
    }
}

/// Thread-safe accumulator for a whole run.
pub struct RunRecorder {
    completed: AtomicU64,
    failed: AtomicU64,
    failures_by_category: [AtomicU64; ErrorCategory::COUNT],
    /// Latencies from 1 microsecond to 60 seconds with 3 significant digits
    latency: Mutex<Histogram<u64>>,
}

impl RunRecorder {
    pub fn new() -> Self {
        let histogram =
            Histogram::new_with_bounds(1, 60_000_000, 3).expect("Failed to create histogram");
        Self {
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            failures_by_category: std::array::from_fn(|_| AtomicU64::new(0)),
            latency: Mutex::new(histogram),
        }
    }

    /// Records one finished execution. Failures count toward the totals but
    /// not the latency percentiles (their timings are partial).
    pub fn record(&self, result: &ResultResponse) {
        self.completed.fetch_add(1, Ordering::Relaxed);

        match result.failure {
            Some(category) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                self.failures_by_category[category.index()].fetch_add(1, Ordering::Relaxed);
            }
            None => {
                let micros = result.timings.total_without_dns().as_micros() as u64;
                let clamped = micros.clamp(1, 60_000_000);
                let mut hist = self.latency.lock().unwrap();
                if let Err(e) = hist.record(clamped) {
                    warn!(latency_us = micros, error = %e, "Failed to record latency in histogram");
                }
            }
        }
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Failure counts per category, nonzero entries only, in stable order.
    pub fn failures(&self) -> Vec<(ErrorCategory, u64)> {
        ErrorCategory::all()
            .into_iter()
            .filter_map(|category| {
                let count = self.failures_by_category[category.index()].load(Ordering::Relaxed);
                (count > 0).then_some((category, count))
            })
            .collect()
    }

    /// Current percentile statistics, or None before the first success.
    pub fn latency_stats(&self) -> Option<PercentileStats> {
        let hist = self.latency.lock().unwrap();
        if hist.is_empty() {
            return None;
        }
        Some(PercentileStats {
            count: hist.len(),
            min: hist.min(),
            max: hist.max(),
            mean: hist.mean(),
            p50: hist.value_at_quantile(0.50),
            p90: hist.value_at_quantile(0.90),
            p95: hist.value_at_quantile(0.95),
            p99: hist.value_at_quantile(0.99),
            p99_9: hist.value_at_quantile(0.999),
        })
    }
}

impl Default for RunRecorder {
    fn default() -> Self {
        Self::new()
    }
}
