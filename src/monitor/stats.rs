//! Detection counters and rolling latency percentiles.

use std::collections::VecDeque;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Rolling summary of log-arrival-to-emission latency
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LatencySummary {
    pub samples: usize,
    pub avg_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

/// Counters kept by the monitor run loop
#[derive(Debug, Default)]
pub struct DetectionStats {
    pub events_received: u64,
    pub events_prefiltered: u64,
    pub signatures_deduped: u64,
    pub transactions_fetched: u64,
    pub fetch_failures: u64,
    pub threats_detected: u64,
    latency_window: usize,
    latencies_ms: VecDeque<f64>,
}

impl DetectionStats {
    pub fn new(latency_window: usize) -> Self {
        Self {
            latency_window: latency_window.max(1),
            ..Self::default()
        }
    }

    /// Record one detection latency sample, evicting the oldest once
    /// the window is full
    pub fn record_latency(&mut self, elapsed: Duration) {
        if self.latencies_ms.len() == self.latency_window {
            self.latencies_ms.pop_front();
        }
        self.latencies_ms.push_back(elapsed.as_secs_f64() * 1000.0);
    }

    pub fn latency_summary(&self) -> LatencySummary {
        if self.latencies_ms.is_empty() {
            return LatencySummary::default();
        }
        let mut sorted: Vec<f64> = self.latencies_ms.iter().copied().collect();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let samples = sorted.len();
        let avg_ms = sorted.iter().sum::<f64>() / samples as f64;
        LatencySummary {
            samples,
            avg_ms,
            p95_ms: percentile(&sorted, 0.95),
            p99_ms: percentile(&sorted, 0.99),
        }
    }
}

/// Nearest-rank percentile over an ascending-sorted slice
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let rank = ((sorted.len() as f64 * q).ceil() as usize).clamp(1, sorted.len());
    sorted[rank - 1]
}
