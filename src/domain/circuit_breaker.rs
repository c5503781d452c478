//! Execution Circuit Breaker
//!
//! Guards the frontrunner's transaction sender: when the most recent
//! window of execution outcomes contains more failures than the
//! configured tolerance, sends are suspended. Threats keep queueing
//! while the breaker is open. After a cooldown the breaker half-opens
//! and allows an attempt; the first success fully resets it.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Default number of recent outcomes considered
pub const DEFAULT_WINDOW_SIZE: usize = 10;

/// Default number of failures tolerated inside the window before
/// tripping
pub const DEFAULT_FAILURE_TOLERANCE: usize = 5;

/// Default cooldown before the breaker half-opens, in milliseconds
pub const DEFAULT_COOLDOWN_MS: u64 = 30_000;

/// Breaker status as exposed by the executor's stats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakerStatus {
    /// Sends suspended
    Open,
    /// Sends allowed
    Closed,
}

/// One recorded execution outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    /// Unix milliseconds when the execution finished
    pub timestamp_ms: u64,
    pub success: bool,
}

/// Bounded ring of recent execution outcomes plus trip state
#[derive(Debug, Clone)]
pub struct FailureWindowBreaker {
    window_size: usize,
    failure_tolerance: usize,
    cooldown_ms: u64,
    outcomes: VecDeque<ExecutionOutcome>,
    tripped_at_ms: Option<u64>,
}

impl Default for FailureWindowBreaker {
    fn default() -> Self {
        Self::new(
            DEFAULT_WINDOW_SIZE,
            DEFAULT_FAILURE_TOLERANCE,
            DEFAULT_COOLDOWN_MS,
        )
    }
}

impl FailureWindowBreaker {
    pub fn new(window_size: usize, failure_tolerance: usize, cooldown_ms: u64) -> Self {
        Self {
            window_size: window_size.max(1),
            failure_tolerance,
            cooldown_ms,
            outcomes: VecDeque::with_capacity(window_size.max(1)),
            tripped_at_ms: None,
        }
    }

    /// Append an outcome, evicting the oldest once the window is full.
    /// A failure that pushes the window past tolerance trips the
    /// breaker; any success resets it.
    pub fn record(&mut self, success: bool, timestamp_ms: u64) {
        if self.outcomes.len() == self.window_size {
            self.outcomes.pop_front();
        }
        self.outcomes.push_back(ExecutionOutcome {
            timestamp_ms,
            success,
        });

        if success {
            if self.tripped_at_ms.take().is_some() {
                tracing::info!("Circuit breaker closed after successful execution");
            }
        } else if self.failure_count() > self.failure_tolerance {
            // Refreshes the trip time when a half-open probe fails
            self.tripped_at_ms = Some(timestamp_ms);
            tracing::error!(
                "Circuit breaker OPEN: {} failures in last {} executions (tolerance {})",
                self.failure_count(),
                self.outcomes.len(),
                self.failure_tolerance
            );
        }
    }

    /// Failures currently inside the window
    pub fn failure_count(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.success).count()
    }

    /// True while sends must be suspended. Once the cooldown elapses the
    /// breaker half-opens and lets the next attempt through.
    pub fn is_tripped(&self, now_ms: u64) -> bool {
        match self.tripped_at_ms {
            Some(t) => now_ms < t.saturating_add(self.cooldown_ms),
            None => false,
        }
    }

    pub fn status(&self, now_ms: u64) -> BreakerStatus {
        if self.is_tripped(now_ms) {
            BreakerStatus::Open
        } else {
            BreakerStatus::Closed
        }
    }

    /// Snapshot of the recent outcome ring, oldest first
    pub fn recent_outcomes(&self) -> Vec<ExecutionOutcome> {
        self.outcomes.iter().copied().collect()
    }

    /// Fraction of successful outcomes in the window; 1.0 when empty
    pub fn success_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 1.0;
        }
        let ok = self.outcomes.iter().filter(|o| o.success).count();
        ok as f64 / self.outcomes.len() as f64
    }

    /// Drop all recorded outcomes and close the breaker
    pub fn reset(&mut self) {
        self.outcomes.clear();
        self.tripped_at_ms = None;
        tracing::info!("Circuit breaker reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> FailureWindowBreaker {
        FailureWindowBreaker::new(10, 5, 30_000)
    }

    #[test]
    fn test_new_breaker_is_closed() {
        let b = breaker();
        assert!(!b.is_tripped(0));
        assert_eq!(b.status(0), BreakerStatus::Closed);
        assert_eq!(b.success_rate(), 1.0);
    }

    #[test]
    fn test_six_failures_trip() {
        let mut b = breaker();
        for i in 0..5u64 {
            b.record(false, i);
            assert!(!b.is_tripped(i), "tolerance not yet exceeded at {i}");
        }
        b.record(false, 5);
        assert!(b.is_tripped(6));
        assert_eq!(b.status(6), BreakerStatus::Open);
    }

    #[test]
    fn test_cooldown_half_opens() {
        let mut b = breaker();
        for i in 0..6u64 {
            b.record(false, i);
        }
        assert!(b.is_tripped(10_000));
        // After the cooldown the next attempt is allowed through
        assert!(!b.is_tripped(5 + 30_000));
    }

    #[test]
    fn test_success_resets() {
        let mut b = breaker();
        for i in 0..6u64 {
            b.record(false, i);
        }
        assert!(b.is_tripped(100));

        // Half-open probe succeeds, breaker closes immediately
        b.record(true, 40_000);
        assert!(!b.is_tripped(40_001));
        assert_eq!(b.status(40_001), BreakerStatus::Closed);
    }

    #[test]
    fn test_failure_while_half_open_retrips() {
        let mut b = breaker();
        for i in 0..6u64 {
            b.record(false, i);
        }
        // Cooldown elapsed, probe fails: window is still saturated
        b.record(false, 40_000);
        assert!(b.is_tripped(40_001));
    }

    #[test]
    fn test_success_rate() {
        let mut b = breaker();
        b.record(true, 0);
        b.record(false, 1);
        b.record(true, 2);
        b.record(true, 3);
        assert!((b.success_rate() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_recent_outcomes_bounded() {
        let mut b = FailureWindowBreaker::new(3, 1, 1000);
        for i in 0..10u64 {
            b.record(i % 2 == 0, i);
        }
        let recent = b.recent_outcomes();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].timestamp_ms, 7);
        assert_eq!(recent[2].timestamp_ms, 9);
    }

    #[test]
    fn test_reset() {
        let mut b = FailureWindowBreaker::new(5, 1, 1000);
        b.record(false, 0);
        b.record(false, 1);
        assert!(b.is_tripped(2));
        b.reset();
        assert!(!b.is_tripped(2));
        assert!(b.recent_outcomes().is_empty());
    }
}
