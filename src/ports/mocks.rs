//! In-memory port implementations that record calls and serve
//! controlled responses. Used by unit and integration tests and by the
//! paper adapters' own tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::execution::{
    BlockhashInfo, BlockhashSource, SendError, SendOptions, SendOutcome, TransactionSender,
};
use super::models::ParsedTransaction;
use super::store::{
    CachedTransaction, StoreError, TargetStore, TargetUpdate, TransactionCache,
};
use super::stream::{FetchError, LogEvent, LogStream, StreamError, TransactionFetcher};
use crate::domain::{ProtectedTarget, ThreatAlert};

/// Target store over a shared in-memory vector, recording alerts and
/// updates for assertion
#[derive(Debug, Default)]
pub struct MockTargetStore {
    targets: Mutex<Vec<ProtectedTarget>>,
    alerts: Arc<Mutex<Vec<ThreatAlert>>>,
    updates: Arc<Mutex<Vec<(String, TargetUpdate)>>>,
}

impl MockTargetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_targets(targets: Vec<ProtectedTarget>) -> Self {
        Self {
            targets: Mutex::new(targets),
            ..Self::default()
        }
    }

    pub fn recorded_alerts(&self) -> Vec<ThreatAlert> {
        self.alerts.lock().unwrap().clone()
    }

    pub fn recorded_updates(&self) -> Vec<(String, TargetUpdate)> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl TargetStore for MockTargetStore {
    async fn load_active(&self) -> Result<Vec<ProtectedTarget>, StoreError> {
        Ok(self.targets.lock().unwrap().clone())
    }

    async fn update(&self, id: &str, update: TargetUpdate) -> Result<(), StoreError> {
        let exists = self.targets.lock().unwrap().iter().any(|t| t.id == id);
        if !exists {
            return Err(StoreError::NotFound(id.to_string()));
        }
        self.updates.lock().unwrap().push((id.to_string(), update));
        Ok(())
    }

    async fn record_alert(&self, alert: &ThreatAlert) -> Result<(), StoreError> {
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

/// Transaction cache backed by a HashMap keyed `wallet:token`
#[derive(Debug, Default)]
pub struct MockTransactionCache {
    entries: Mutex<HashMap<String, CachedTransaction>>,
    lookups: Arc<Mutex<Vec<String>>>,
}

impl MockTransactionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(self, key: &str, tx: CachedTransaction) -> Self {
        self.entries.lock().unwrap().insert(key.to_string(), tx);
        self
    }

    pub fn recorded_lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransactionCache for MockTransactionCache {
    async fn get_transaction(&self, key: &str) -> Option<CachedTransaction> {
        self.lookups.lock().unwrap().push(key.to_string());
        self.entries.lock().unwrap().get(key).cloned()
    }
}

/// Sender that records every send and can be scripted to fail the
/// first N attempts
#[derive(Debug, Default)]
pub struct MockTransactionSender {
    sends: Arc<Mutex<Vec<SendOptions>>>,
    failures_remaining: AtomicU32,
    fail_always: std::sync::atomic::AtomicBool,
}

impl MockTransactionSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `n` sends with a timeout, then succeed
    pub fn failing_first(n: u32) -> Self {
        let sender = Self::default();
        sender.failures_remaining.store(n, Ordering::SeqCst);
        sender
    }

    /// Fail every send
    pub fn always_failing() -> Self {
        let sender = Self::default();
        sender.fail_always.store(true, Ordering::SeqCst);
        sender
    }

    pub fn sent_options(&self) -> Vec<SendOptions> {
        self.sends.lock().unwrap().clone()
    }

    pub fn send_count(&self) -> usize {
        self.sends.lock().unwrap().len()
    }
}

#[async_trait]
impl TransactionSender for MockTransactionSender {
    async fn send_transaction(
        &self,
        _transaction: &[u8],
        options: &SendOptions,
    ) -> Result<SendOutcome, SendError> {
        self.sends.lock().unwrap().push(*options);
        if self.fail_always.load(Ordering::SeqCst) {
            return Err(SendError::Timeout);
        }
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(SendError::Timeout);
        }
        Ok(SendOutcome {
            signature: format!("MockSig{}", self.sends.lock().unwrap().len()),
            confirmation_time_ms: 40,
        })
    }
}

/// Blockhash source that hands out a fresh hash per call
#[derive(Debug, Default)]
pub struct MockBlockhashSource {
    calls: AtomicU64,
}

impl MockBlockhashSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlockhashSource for MockBlockhashSource {
    async fn get_valid_blockhash(&self) -> Result<BlockhashInfo, SendError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(BlockhashInfo {
            blockhash: format!("MockHash{n}"),
            last_valid_block_height: 100_000 + n,
        })
    }
}

/// Fetcher serving pre-loaded parsed transactions by signature
#[derive(Debug, Default)]
pub struct MockTransactionFetcher {
    transactions: Mutex<HashMap<String, ParsedTransaction>>,
    /// Signatures that fail with an RPC error the first `u32` times
    flaky: Mutex<HashMap<String, u32>>,
    fetches: Arc<Mutex<Vec<String>>>,
}

impl MockTransactionFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transaction(self, tx: ParsedTransaction) -> Self {
        self.transactions
            .lock()
            .unwrap()
            .insert(tx.signature.clone(), tx);
        self
    }

    /// Make `signature` fail `failures` times before resolving
    pub fn with_flaky(self, signature: &str, failures: u32) -> Self {
        self.flaky
            .lock()
            .unwrap()
            .insert(signature.to_string(), failures);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.lock().unwrap().len()
    }
}

#[async_trait]
impl TransactionFetcher for MockTransactionFetcher {
    async fn fetch_parsed(&self, signature: &str) -> Result<ParsedTransaction, FetchError> {
        self.fetches.lock().unwrap().push(signature.to_string());
        {
            let mut flaky = self.flaky.lock().unwrap();
            if let Some(remaining) = flaky.get_mut(signature) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(FetchError::Rpc("transient".to_string()));
                }
            }
        }
        self.transactions
            .lock()
            .unwrap()
            .get(signature)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(signature.to_string()))
    }
}

/// Log stream driven manually from tests via `emit`
#[derive(Debug, Default)]
pub struct MockLogStream {
    sender: Mutex<Option<mpsc::Sender<LogEvent>>>,
    subscriptions: Arc<Mutex<Vec<String>>>,
}

impl MockLogStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push one log event into the connected channel
    pub async fn emit(&self, event: LogEvent) -> bool {
        let sender = self.sender.lock().unwrap().clone();
        match sender {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }

    pub fn subscribed_programs(&self) -> Vec<String> {
        self.subscriptions.lock().unwrap().clone()
    }
}

#[async_trait]
impl LogStream for MockLogStream {
    async fn connect(&self, events: mpsc::Sender<LogEvent>) -> Result<(), StreamError> {
        *self.sender.lock().unwrap() = Some(events);
        Ok(())
    }

    async fn subscribe_logs(&self, program_id: &str) -> Result<u64, StreamError> {
        if self.sender.lock().unwrap().is_none() {
            return Err(StreamError::NotConnected);
        }
        let mut subs = self.subscriptions.lock().unwrap();
        subs.push(program_id.to_string());
        Ok(subs.len() as u64)
    }

    async fn disconnect(&self) -> Result<(), StreamError> {
        *self.sender.lock().unwrap() = None;
        Ok(())
    }
}
