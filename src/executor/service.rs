//! Frontrunner Service
//!
//! Consumes `ThreatDetected` events and races the threatening
//! transaction with a pre-signed emergency sell. One pending entry per
//! `wallet:token` pair, latest threat wins. Every send outcome feeds
//! the circuit breaker; while the breaker is open new threats still
//! queue but nothing is sent.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::config::ExecutionSection;
use crate::domain::{now_ms, BreakerStatus, ExecutionOutcome, FailureWindowBreaker, ThreatDetectedEvent};
use crate::events::{EventBus, SentinelEvent};
use crate::ports::{
    BlockhashSource, SendError, SendOptions, SendOutcome, TransactionCache, TransactionSender,
};

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Circuit breaker open, refusing to execute")]
    BreakerOpen,

    #[error("No cached transaction for {0}")]
    NoCachedTransaction(String),

    #[error("all {attempts} send attempts failed, last: {last}")]
    AttemptsExhausted { attempts: u32, last: SendError },
}

/// Snapshot returned by `get_stats`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorStats {
    pub queue_size: usize,
    pub active_executions: usize,
    pub executions_succeeded: u64,
    pub executions_failed: u64,
    pub success_rate: f64,
    pub breaker: BreakerStatus,
    pub recent_outcomes: Vec<ExecutionOutcome>,
}

/// Protective execution service. Cloning shares all state; clones are
/// handles onto the same queue, breaker, and counters.
#[derive(Clone)]
pub struct FrontrunnerService {
    config: ExecutionSection,
    cache: Arc<dyn TransactionCache>,
    sender: Arc<dyn TransactionSender>,
    blockhash: Arc<dyn BlockhashSource>,
    bus: EventBus,
    queue: Arc<Mutex<HashMap<String, ThreatDetectedEvent>>>,
    in_flight: Arc<Mutex<HashSet<String>>>,
    breaker: Arc<Mutex<FailureWindowBreaker>>,
    limiter: Arc<Semaphore>,
    running: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
    succeeded: Arc<AtomicUsize>,
    failed: Arc<AtomicUsize>,
}

impl FrontrunnerService {
    pub fn new(
        config: ExecutionSection,
        cache: Arc<dyn TransactionCache>,
        sender: Arc<dyn TransactionSender>,
        blockhash: Arc<dyn BlockhashSource>,
        bus: EventBus,
    ) -> Self {
        let breaker = FailureWindowBreaker::new(
            config.breaker_window,
            config.breaker_failure_tolerance,
            config.breaker_cooldown_ms,
        );
        let limiter = Arc::new(Semaphore::new(config.max_concurrent_executions));
        Self {
            config,
            cache,
            sender,
            blockhash,
            bus,
            queue: Arc::new(Mutex::new(HashMap::new())),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            breaker: Arc::new(Mutex::new(breaker)),
            limiter,
            running: Arc::new(AtomicBool::new(false)),
            active: Arc::new(AtomicUsize::new(0)),
            succeeded: Arc::new(AtomicUsize::new(0)),
            failed: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn queue_guard(&self) -> MutexGuard<'_, HashMap<String, ThreatDetectedEvent>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn breaker_guard(&self) -> MutexGuard<'_, FailureWindowBreaker> {
        self.breaker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn in_flight_guard(&self) -> MutexGuard<'_, HashSet<String>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribe to the bus and drive executions until `stop`. A
    /// periodic sweep re-drives entries still queued, so threats
    /// refused while the breaker was open execute once it allows
    /// sends again.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let service = self.clone();
        let mut rx = self.bus.subscribe();
        tokio::spawn(async move {
            info!("Frontrunner service running");
            while service.running.load(Ordering::SeqCst) {
                match rx.recv().await {
                    Ok(SentinelEvent::ThreatDetected(event)) => {
                        service.handle_threat(event).await;
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "Execution loop lagged behind the event bus");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("Frontrunner loop exited");
        });

        let sweeper = self.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_millis(
                sweeper.config.queue_drain_interval_ms.max(1),
            ));
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tick.tick().await;
                if !sweeper.running.load(Ordering::SeqCst) {
                    break;
                }
                if sweeper.breaker_guard().is_tripped(now_ms()) {
                    continue;
                }
                let keys: Vec<String> = sweeper.queue_guard().keys().cloned().collect();
                for key in keys {
                    sweeper.spawn_execution(key);
                }
            }
            debug!("Queue sweep loop exited");
        });
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Upsert the pending entry for this wallet:token pair and kick off
    /// an execution attempt. A newer threat for the same pair replaces
    /// the older one; the execution task reads whatever entry is
    /// current at send time.
    pub async fn handle_threat(&self, event: ThreatDetectedEvent) {
        let key = event.queue_key();
        {
            let mut queue = self.queue_guard();
            if let Some(previous) = queue.insert(key.clone(), event.clone()) {
                debug!(
                    key = %key,
                    superseded = %previous.signature,
                    by = %event.signature,
                    "Pending threat superseded"
                );
            }
        }
        self.spawn_execution(key);
    }

    /// Execute the latest pending entry under `key` in a background
    /// task. At most one execution per key runs at a time; anything
    /// refused or superseded stays queued for the sweep loop.
    fn spawn_execution(&self, key: String) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        if !self.in_flight_guard().insert(key.clone()) {
            return;
        }
        let service = self.clone();
        tokio::spawn(async move {
            let Ok(_permit) = service.limiter.clone().acquire_owned().await else {
                service.in_flight_guard().remove(&key);
                return;
            };
            // Read the entry at execution time so a threat that
            // superseded this spawn is the one acted on
            let Some(event) = service.pending(&key) else {
                service.in_flight_guard().remove(&key);
                return;
            };
            service.active.fetch_add(1, Ordering::SeqCst);
            let result = service.execute_threat_response(&event).await;
            service.active.fetch_sub(1, Ordering::SeqCst);
            service.in_flight_guard().remove(&key);
            if let Err(e) = result {
                debug!(key = %key, error = %e, "Execution did not complete");
            }
        });
    }

    /// Run the full protective response for one threat.
    ///
    /// Order matters: the breaker gate comes before the cache lookup,
    /// and the cache miss comes before any send. Each attempt refreshes
    /// the blockhash so a slow first attempt cannot expire the rest.
    pub async fn execute_threat_response(
        &self,
        event: &ThreatDetectedEvent,
    ) -> Result<SendOutcome, ExecutionError> {
        let key = event.queue_key();

        if self.breaker_guard().is_tripped(now_ms()) {
            warn!(key = %key, "Circuit breaker open, refusing to execute");
            return Err(ExecutionError::BreakerOpen);
        }

        let cached = match self.cache.get_transaction(&key).await {
            Some(cached) => cached,
            None => {
                // A missing pre-signed transaction is terminal: report
                // it and drop the entry like an exhausted retry
                let err = ExecutionError::NoCachedTransaction(key.clone());
                error!(key = %key, "No cached transaction for threatened position");
                self.failed.fetch_add(1, Ordering::SeqCst);
                self.finish(event);
                self.bus.publish(SentinelEvent::ExecutionFailed {
                    token_mint: event.token_mint.clone(),
                    wallet_address: event.wallet_address.clone(),
                    error: err.to_string(),
                    attempts_made: 0,
                });
                return Err(err);
            }
        };

        let priority_fee = compute_priority_fee(
            self.config.base_priority_fee_micro_lamports,
            self.config.max_priority_fee_micro_lamports,
            event.analysis.risk_level.fee_multiplier(),
            event.priority_fee_multiplier,
        );
        let options = SendOptions {
            priority_fee_micro_lamports: priority_fee,
            skip_preflight: true,
            max_retries: 0,
        };

        let mut last_error = SendError::Timeout;
        for attempt in 1..=self.config.max_send_attempts {
            match self.blockhash.get_valid_blockhash().await {
                Ok(info) => {
                    debug!(key = %key, attempt, blockhash = %info.blockhash, "Sending protective transaction")
                }
                Err(e) => {
                    warn!(key = %key, attempt, error = %e, "Blockhash refresh failed");
                    last_error = e;
                    continue;
                }
            }

            match self.sender.send_transaction(&cached.transaction, &options).await {
                Ok(outcome) => {
                    self.breaker_guard().record(true, now_ms());
                    self.succeeded.fetch_add(1, Ordering::SeqCst);
                    self.finish(event);
                    info!(
                        key = %key,
                        signature = %outcome.signature,
                        confirmation_ms = outcome.confirmation_time_ms,
                        attempt,
                        "Protective transaction confirmed"
                    );
                    self.bus.publish(SentinelEvent::ExecutionSuccess {
                        token_mint: event.token_mint.clone(),
                        wallet_address: event.wallet_address.clone(),
                        signature: outcome.signature.clone(),
                        confirmation_time_ms: outcome.confirmation_time_ms,
                        attempts_made: attempt,
                    });
                    return Ok(outcome);
                }
                Err(e) => {
                    warn!(key = %key, attempt, error = %e, "Protective send failed");
                    last_error = e;
                    if attempt < self.config.max_send_attempts {
                        tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms))
                            .await;
                    }
                }
            }
        }

        self.breaker_guard().record(false, now_ms());
        self.failed.fetch_add(1, Ordering::SeqCst);
        self.finish(event);
        error!(key = %key, attempts = self.config.max_send_attempts, "Protective execution failed");
        self.bus.publish(SentinelEvent::ExecutionFailed {
            token_mint: event.token_mint.clone(),
            wallet_address: event.wallet_address.clone(),
            error: last_error.to_string(),
            attempts_made: self.config.max_send_attempts,
        });
        Err(ExecutionError::AttemptsExhausted {
            attempts: self.config.max_send_attempts,
            last: last_error,
        })
    }

    /// Remove the queue entry unless a newer threat superseded it
    /// while this execution was in flight
    fn finish(&self, event: &ThreatDetectedEvent) {
        let key = event.queue_key();
        let mut queue = self.queue_guard();
        if let Some(pending) = queue.get(&key) {
            if pending.signature == event.signature && pending.timestamp_ms == event.timestamp_ms {
                queue.remove(&key);
            }
        }
    }

    pub fn pending(&self, key: &str) -> Option<ThreatDetectedEvent> {
        self.queue_guard().get(key).cloned()
    }

    pub fn get_stats(&self) -> ExecutorStats {
        let breaker = self.breaker_guard();
        ExecutorStats {
            queue_size: self.queue_guard().len(),
            active_executions: self.active.load(Ordering::SeqCst),
            executions_succeeded: self.succeeded.load(Ordering::SeqCst) as u64,
            executions_failed: self.failed.load(Ordering::SeqCst) as u64,
            success_rate: breaker.success_rate(),
            breaker: breaker.status(now_ms()),
            recent_outcomes: breaker.recent_outcomes(),
        }
    }
}

/// `base × riskMultiplier × userMultiplier`, capped at `max`
pub fn compute_priority_fee(
    base_micro_lamports: u64,
    max_micro_lamports: u64,
    risk_multiplier: f64,
    user_multiplier: f64,
) -> u64 {
    let fee = base_micro_lamports as f64 * risk_multiplier * user_multiplier;
    (fee as u64).min(max_micro_lamports)
}
