//! Run statistics.

use std::time::Duration;

use conv_common::ErrorKind;
use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};

/// Collects outcomes while lifecycles complete.
pub struct MetricsCollector {
    histogram: Histogram<u64>,
    requests_total: u64,
    requests_success: u64,
    rejected_too_large: u64,
    transport_failures: u64,
    invalid_input: u64,
    lost: u64,
    results_total: u64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            histogram: Histogram::new(3).expect("3 significant figures is a valid precision"),
            requests_total: 0,
            requests_success: 0,
            rejected_too_large: 0,
            transport_failures: 0,
            invalid_input: 0,
            lost: 0,
            results_total: 0,
        }
    }

    /// Record a completed round-trip.
    pub fn record_success(&mut self, latency: Duration, results: usize) {
        self.requests_total += 1;
        self.requests_success += 1;
        self.results_total += results as u64;
        self.histogram
            .saturating_record(latency.as_micros().min(u64::MAX as u128) as u64);
    }

    /// Record a lifecycle that ended with an error.
    pub fn record_failure(&mut self, kind: ErrorKind) {
        self.requests_total += 1;
        match kind {
            ErrorKind::RequestTooLarge => self.rejected_too_large += 1,
            ErrorKind::TransportFailure => self.transport_failures += 1,
            ErrorKind::ConfigurationInvalid | ErrorKind::ConfigurationMissing => {
                self.invalid_input += 1
            }
        }
    }

    /// Record a lifecycle whose task died without reporting.
    pub fn record_lost(&mut self) {
        self.requests_total += 1;
        self.lost += 1;
    }

    /// Generate the final summary.
    pub fn summary(&self, front_url: String, elapsed: Duration) -> RunSummary {
        let recorded = !self.histogram.is_empty();
        let ms = |us: u64| us as f64 / 1000.0;

        RunSummary {
            timestamp: chrono::Utc::now().to_rfc3339(),
            front_url,
            duration_secs: elapsed.as_secs_f64(),
            total_requests: self.requests_total,
            successful_requests: self.requests_success,
            failed_requests: self.requests_total - self.requests_success,
            rejected_too_large: self.rejected_too_large,
            transport_failures: self.transport_failures,
            invalid_input: self.invalid_input,
            lost: self.lost,
            results_total: self.results_total,
            latency_min: if recorded { ms(self.histogram.min()) } else { 0.0 },
            latency_p50: ms(self.histogram.value_at_quantile(0.50)),
            latency_p90: ms(self.histogram.value_at_quantile(0.90)),
            latency_p99: ms(self.histogram.value_at_quantile(0.99)),
            latency_max: if recorded { ms(self.histogram.max()) } else { 0.0 },
            latency_avg: if recorded { self.histogram.mean() / 1000.0 } else { 0.0 },
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Final run statistics. Latencies are in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub timestamp: String,
    pub front_url: String,
    pub duration_secs: f64,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub rejected_too_large: u64,
    pub transport_failures: u64,
    pub invalid_input: u64,
    pub lost: u64,
    pub results_total: u64,

    pub latency_min: f64,
    pub latency_p50: f64,
    pub latency_p90: f64,
    pub latency_p99: f64,
    pub latency_max: f64,
    pub latency_avg: f64,
}

impl RunSummary {
    /// Share of successful lifecycles in percent.
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.successful_requests as f64 / self.total_requests as f64 * 100.0
    }
}
