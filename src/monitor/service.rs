//! Mempool Monitor Service
//!
//! Watches program logs in realtime, prefilters them against the bloom
//! watch filters, fetches and classifies the full transactions, and
//! publishes `ThreatDetected` events for every protected target whose
//! threshold the classification crosses.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock, Semaphore};
use tracing::{debug, info, warn};

use crate::config::{FiltersSection, MonitorSection};
use crate::domain::known_programs::MONITORED_PROGRAMS;
use crate::domain::{
    AnalyzerConfig, ProtectedTarget, TargetRegistry, ThreatAlert, ThreatDetectedEvent,
    TransactionAnalyzer, WatchFilters,
};
use crate::events::{EventBus, SentinelEvent};
use crate::monitor::stats::{DetectionStats, LatencySummary};
use crate::ports::{
    LogEvent, LogStream, ParsedTransaction, StreamError, TargetChange, TargetStore,
    TransactionFetcher,
};

/// Channel capacity for raw log events
const EVENT_CHANNEL_CAPACITY: usize = 4096;
/// Channel capacity for fetched transactions awaiting analysis
const FETCHED_CHANNEL_CAPACITY: usize = 1024;
/// Channel capacity for control commands
const COMMAND_CHANNEL_CAPACITY: usize = 64;
/// Base58 identifier length bounds (Solana addresses and mints)
const MIN_IDENTIFIER_LEN: usize = 32;
const MAX_IDENTIFIER_LEN: usize = 44;

fn stats_guard(stats: &Mutex<DetectionStats>) -> MutexGuard<'_, DetectionStats> {
    stats.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("monitor is already running")]
    AlreadyRunning,

    #[error("monitor is not running")]
    NotRunning,

    #[error("log stream: {0}")]
    Stream(#[from] StreamError),

    #[error("target store: {0}")]
    Store(#[from] crate::ports::StoreError),

    #[error("command channel closed")]
    ChannelClosed,
}

/// Lifecycle of the monitor service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Scheduling bucket derived from raw log text before the full
/// transaction is available
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventPriority {
    Critical,
    High,
    Normal,
    Low,
}

/// Bucket a log event by the threat keywords visible in its log lines
pub fn determine_priority(logs: &[String]) -> EventPriority {
    let mut priority = EventPriority::Low;
    for line in logs {
        let lower = line.to_lowercase();
        if lower.contains("removeliquidity")
            || lower.contains("remove_liquidity")
            || lower.contains("withdraw")
        {
            return EventPriority::Critical;
        }
        if lower.contains("freezeaccount")
            || lower.contains("freeze_account")
            || lower.contains("setauthority")
            || lower.contains("set_authority")
        {
            priority = priority.min(EventPriority::High);
        } else if lower.contains("swap") {
            priority = priority.min(EventPriority::Normal);
        }
    }
    priority
}

/// Heap entry: highest priority first, FIFO within a priority
struct PrioritizedEvent {
    priority: EventPriority,
    seq: u64,
    event: LogEvent,
}

impl PartialEq for PrioritizedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for PrioritizedEvent {}

impl Ord for PrioritizedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; invert so Critical pops first and
        // lower sequence numbers win within a bucket
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for PrioritizedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Bounded signature dedup set, FIFO eviction
struct SeenSignatures {
    capacity: usize,
    set: HashSet<String>,
    order: VecDeque<String>,
}

impl SeenSignatures {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            set: HashSet::new(),
            order: VecDeque::new(),
        }
    }

    /// Returns false if the signature was already present
    fn insert(&mut self, signature: &str) -> bool {
        if self.set.contains(signature) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.set.remove(&oldest);
            }
        }
        self.set.insert(signature.to_string());
        self.order.push_back(signature.to_string());
        true
    }
}

enum MonitorCommand {
    ApplyChange(TargetChange),
    Shutdown,
}

/// Fetch-worker result handed back to the analysis loop
struct FetchedTransaction {
    event: LogEvent,
    tx: ParsedTransaction,
}

/// Realtime detection service wired to a log stream, a transaction
/// fetcher, the target store, and the event bus
pub struct MempoolMonitor {
    config: MonitorSection,
    filters_config: FiltersSection,
    analyzer_config: AnalyzerConfig,
    stream: Arc<dyn LogStream>,
    fetcher: Arc<dyn TransactionFetcher>,
    store: Arc<dyn TargetStore>,
    bus: EventBus,
    state: Arc<RwLock<MonitorState>>,
    stats: Arc<Mutex<DetectionStats>>,
    command_tx: Mutex<mpsc::Sender<MonitorCommand>>,
    generation: Arc<AtomicU64>,
}

impl MempoolMonitor {
    pub fn new(
        config: MonitorSection,
        filters_config: FiltersSection,
        analyzer_config: AnalyzerConfig,
        stream: Arc<dyn LogStream>,
        fetcher: Arc<dyn TransactionFetcher>,
        store: Arc<dyn TargetStore>,
        bus: EventBus,
    ) -> Self {
        // Commands sent before the first start() are rejected; each
        // start() installs a fresh channel
        let (command_tx, _) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let stats = Arc::new(Mutex::new(DetectionStats::new(config.latency_window)));
        Self {
            config,
            filters_config,
            analyzer_config,
            stream,
            fetcher,
            store,
            bus,
            state: Arc::new(RwLock::new(MonitorState::Stopped)),
            stats,
            command_tx: Mutex::new(command_tx),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    fn command_sender(&self) -> mpsc::Sender<MonitorCommand> {
        self.command_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub async fn state(&self) -> MonitorState {
        *self.state.read().await
    }

    pub fn latency_summary(&self) -> LatencySummary {
        stats_guard(&self.stats).latency_summary()
    }

    pub fn threats_detected(&self) -> u64 {
        stats_guard(&self.stats).threats_detected
    }

    /// Load the watch list, connect the stream, subscribe to every
    /// monitored program, and spawn the detection loop. Any failure
    /// during startup tears the connection down and leaves the monitor
    /// stopped.
    pub async fn start(&self) -> Result<(), MonitorError> {
        {
            let mut state = self.state.write().await;
            if *state != MonitorState::Stopped {
                return Err(MonitorError::AlreadyRunning);
            }
            *state = MonitorState::Starting;
        }

        match self.start_inner().await {
            Ok(()) => {
                *self.state.write().await = MonitorState::Running;
                info!("Mempool monitor running");
                Ok(())
            }
            Err(e) => {
                let _ = self.stream.disconnect().await;
                *self.state.write().await = MonitorState::Stopped;
                Err(e)
            }
        }
    }

    async fn start_inner(&self) -> Result<(), MonitorError> {
        let targets = self.store.load_active().await?;
        let mut registry = TargetRegistry::new();
        let mut filters =
            WatchFilters::new(self.filters_config.expected_items, self.filters_config.fp_rate);
        for target in targets {
            filters.add_target(&target);
            registry.insert(target);
        }
        info!(
            targets = registry.len(),
            tokens = registry.token_count(),
            "Loaded protected targets"
        );

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        self.stream.connect(event_tx).await?;
        for program in MONITORED_PROGRAMS {
            let sub_id = self.stream.subscribe_logs(program).await?;
            debug!(program, sub_id, "Subscribed to program logs");
        }

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        *self
            .command_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = command_tx;

        let worker = MonitorWorker {
            config: self.config.clone(),
            analyzer: TransactionAnalyzer::new(self.analyzer_config.clone()),
            registry,
            filters,
            fetcher: Arc::clone(&self.fetcher),
            fetch_limiter: Arc::new(Semaphore::new(self.config.max_concurrent_fetches)),
            store: Arc::clone(&self.store),
            bus: self.bus.clone(),
            stats: Arc::clone(&self.stats),
            state: Arc::clone(&self.state),
            generation: self.generation.fetch_add(1, AtomicOrdering::SeqCst) + 1,
            latest_generation: Arc::clone(&self.generation),
        };
        tokio::spawn(worker.run(event_rx, command_rx));
        Ok(())
    }

    /// Idempotent shutdown: unsubscribes, disconnects, and stops the
    /// worker loop
    pub async fn stop(&self) -> Result<(), MonitorError> {
        {
            let mut state = self.state.write().await;
            if *state == MonitorState::Stopped {
                return Ok(());
            }
            *state = MonitorState::Stopping;
        }
        let _ = self.command_sender().send(MonitorCommand::Shutdown).await;
        let _ = self.stream.disconnect().await;
        *self.state.write().await = MonitorState::Stopped;
        info!("Mempool monitor stopped");
        Ok(())
    }

    /// Add one target to the live watch list
    pub async fn protect(&self, target: ProtectedTarget) -> Result<(), MonitorError> {
        self.command_sender()
            .send(MonitorCommand::ApplyChange(TargetChange::Insert(target)))
            .await
            .map_err(|_| MonitorError::ChannelClosed)
    }

    /// Remove one target from the live watch list
    pub async fn unprotect(&self, target: ProtectedTarget) -> Result<(), MonitorError> {
        self.command_sender()
            .send(MonitorCommand::ApplyChange(TargetChange::Delete(target)))
            .await
            .map_err(|_| MonitorError::ChannelClosed)
    }
}

/// Loop-local state moved into the spawned detection task
struct MonitorWorker {
    config: MonitorSection,
    analyzer: TransactionAnalyzer,
    registry: TargetRegistry,
    filters: WatchFilters,
    fetcher: Arc<dyn TransactionFetcher>,
    fetch_limiter: Arc<Semaphore>,
    store: Arc<dyn TargetStore>,
    bus: EventBus,
    stats: Arc<Mutex<DetectionStats>>,
    state: Arc<RwLock<MonitorState>>,
    /// Run this worker belongs to; a restarted monitor leaves stale
    /// workers unable to touch the shared state
    generation: u64,
    latest_generation: Arc<AtomicU64>,
}

impl MonitorWorker {
    async fn run(
        mut self,
        mut event_rx: mpsc::Receiver<LogEvent>,
        mut command_rx: mpsc::Receiver<MonitorCommand>,
    ) {
        let mut seen = SeenSignatures::new(self.config.seen_signature_capacity);
        let mut heap: BinaryHeap<PrioritizedEvent> = BinaryHeap::new();
        let mut seq = 0u64;
        let (fetched_tx, mut fetched_rx) =
            mpsc::channel::<FetchedTransaction>(FETCHED_CHANNEL_CAPACITY);
        let mut refresh = tokio::time::interval(Duration::from_secs(
            self.config.registry_refresh_seconds.max(1),
        ));
        refresh.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately and the list was just loaded
        refresh.tick().await;

        loop {
            tokio::select! {
                biased;

                cmd = command_rx.recv() => match cmd {
                    Some(MonitorCommand::Shutdown) | None => break,
                    Some(MonitorCommand::ApplyChange(change)) => self.apply_change(change),
                },

                _ = refresh.tick() => self.reload_targets().await,

                maybe = fetched_rx.recv() => {
                    if let Some(fetched) = maybe {
                        self.handle_fetched(fetched.event, fetched.tx).await;
                    }
                }

                maybe = event_rx.recv() => {
                    let Some(event) = maybe else {
                        warn!("Log event channel closed, stopping monitor loop");
                        break;
                    };
                    if let Some(entry) = self.admit(event, &mut seen, &mut seq) {
                        heap.push(entry);
                    }
                    // Order whatever else is already queued before
                    // dispatching, so critical events jump the line
                    while let Ok(event) = event_rx.try_recv() {
                        if let Some(entry) = self.admit(event, &mut seen, &mut seq) {
                            heap.push(entry);
                        }
                    }
                    while let Some(entry) = heap.pop() {
                        self.spawn_fetch(entry.event, &fetched_tx);
                    }
                }
            }
        }

        if self.latest_generation.load(AtomicOrdering::SeqCst) == self.generation {
            *self.state.write().await = MonitorState::Stopped;
        }
        debug!("Monitor loop exited");
    }

    /// Prefilter and dedup; returns the heap entry for admitted events
    fn admit(
        &self,
        event: LogEvent,
        seen: &mut SeenSignatures,
        seq: &mut u64,
    ) -> Option<PrioritizedEvent> {
        let mut stats = stats_guard(&self.stats);
        stats.events_received += 1;

        if !self.mentions_watched_identifier(&event) {
            stats.events_prefiltered += 1;
            return None;
        }
        if !seen.insert(&event.signature) {
            stats.signatures_deduped += 1;
            return None;
        }
        drop(stats);

        let priority = determine_priority(&event.logs);
        let entry = PrioritizedEvent {
            priority,
            seq: *seq,
            event,
        };
        *seq += 1;
        Some(entry)
    }

    /// Cheap negative check: scan log text for base58-plausible
    /// identifiers and test them against the bloom filters
    fn mentions_watched_identifier(&self, event: &LogEvent) -> bool {
        for line in &event.logs {
            for word in line.split(|c: char| !c.is_ascii_alphanumeric()) {
                if (MIN_IDENTIFIER_LEN..=MAX_IDENTIFIER_LEN).contains(&word.len())
                    && is_base58(word)
                    && self.filters.contains_any(word)
                {
                    return true;
                }
            }
        }
        false
    }

    /// Fetch in a bounded background task so one slow RPC response
    /// cannot hold higher-priority events behind it
    fn spawn_fetch(&self, event: LogEvent, results: &mpsc::Sender<FetchedTransaction>) {
        let fetcher = Arc::clone(&self.fetcher);
        let stats = Arc::clone(&self.stats);
        let limiter = Arc::clone(&self.fetch_limiter);
        let results = results.clone();
        let max_attempts = self.config.max_fetch_attempts;
        let base_delay_ms = self.config.fetch_retry_delay_ms;
        tokio::spawn(async move {
            let Ok(_permit) = limiter.acquire_owned().await else {
                return;
            };
            match fetch_with_retry(fetcher.as_ref(), &event.signature, max_attempts, base_delay_ms)
                .await
            {
                Some(tx) => {
                    stats_guard(&stats).transactions_fetched += 1;
                    let _ = results.send(FetchedTransaction { event, tx }).await;
                }
                None => stats_guard(&stats).fetch_failures += 1,
            }
        });
    }

    async fn handle_fetched(&mut self, event: LogEvent, tx: ParsedTransaction) {
        let Some(analysis) = self.analyzer.analyze_transaction(&tx) else {
            return;
        };
        if !analysis.is_dangerous {
            return;
        }

        // Candidate tokens come from the structural analysis plus any
        // account key that is itself a protected mint
        let mut candidates: HashSet<&str> =
            analysis.affected_tokens.iter().map(String::as_str).collect();
        for key in &tx.account_keys {
            if self.registry.contains_token(key) {
                candidates.insert(key.as_str());
            }
        }

        let mut emitted = 0u64;
        for token in candidates {
            for target in self.registry.targets_for(token) {
                if !target.triggered_by(analysis.risk_level) {
                    continue;
                }
                let detected = ThreatDetectedEvent::new(
                    event.signature.clone(),
                    target.token_mint.clone(),
                    target.wallet_address.clone(),
                    analysis.clone(),
                    target.clamped_multiplier(),
                );
                info!(
                    signature = %detected.signature,
                    token = %detected.token_mint,
                    wallet = %detected.wallet_address,
                    threat = ?analysis.threat_type,
                    risk = ?analysis.risk_level,
                    "Threat detected"
                );
                let alert = ThreatAlert::from_event(&detected);
                self.bus.publish(SentinelEvent::ThreatDetected(detected));
                emitted += 1;

                // Alert persistence must never delay the hot path
                let store = Arc::clone(&self.store);
                tokio::spawn(async move {
                    if let Err(e) = store.record_alert(&alert).await {
                        warn!(error = %e, "Failed to persist threat alert");
                    }
                });
            }
        }

        if emitted > 0 {
            let mut stats = stats_guard(&self.stats);
            stats.threats_detected += emitted;
            stats.record_latency(event.received_at.elapsed());
        }
    }

    fn apply_change(&mut self, change: TargetChange) {
        match change {
            TargetChange::Insert(target) => {
                debug!(token = %target.token_mint, wallet = %target.wallet_address, "Target added");
                self.filters.add_target(&target);
                self.registry.insert(target);
            }
            TargetChange::Delete(target) => {
                debug!(token = %target.token_mint, wallet = %target.wallet_address, "Target removed");
                if self.registry.remove(&target.token_mint, &target.wallet_address) {
                    // Bloom filters cannot delete; rebuild from the
                    // surviving registry entries
                    self.filters.rebuild_from(self.registry.iter());
                }
            }
        }
    }

    async fn reload_targets(&mut self) {
        match self.store.load_active().await {
            Ok(targets) => {
                let mut registry = TargetRegistry::new();
                for target in targets {
                    registry.insert(target);
                }
                self.filters.rebuild_from(registry.iter());
                self.registry = registry;
                debug!(targets = self.registry.len(), "Watch list refreshed");
            }
            Err(e) => warn!(error = %e, "Watch list refresh failed"),
        }
    }
}

/// Bounded fetch retry with exponential backoff and jitter
async fn fetch_with_retry(
    fetcher: &dyn TransactionFetcher,
    signature: &str,
    max_attempts: u32,
    base_delay_ms: u64,
) -> Option<ParsedTransaction> {
    for attempt in 0..max_attempts {
        match fetcher.fetch_parsed(signature).await {
            Ok(tx) => return Some(tx),
            Err(e) => {
                debug!(signature, attempt, error = %e, "Transaction fetch failed");
                if attempt + 1 < max_attempts {
                    let base = base_delay_ms << attempt;
                    let jitter = rand::thread_rng().gen_range(0..=base / 2 + 1);
                    tokio::time::sleep(Duration::from_millis(base + jitter)).await;
                }
            }
        }
    }
    None
}

fn is_base58(word: &str) -> bool {
    word.bytes().all(|b| {
        b.is_ascii_alphanumeric() && b != b'0' && b != b'O' && b != b'I' && b != b'l'
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RiskLevel;
    use crate::ports::mocks::{MockLogStream, MockTargetStore, MockTransactionFetcher};
    use crate::ports::{ParsedInstruction, ParsedTransaction};

    const MINT: &str = "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU";
    const WALLET: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";

    fn target() -> ProtectedTarget {
        ProtectedTarget {
            id: "t1".to_string(),
            token_mint: MINT.to_string(),
            wallet_address: WALLET.to_string(),
            pool_address: None,
            risk_threshold: RiskLevel::High,
            priority_fee_multiplier: 1.5,
        }
    }

    fn dangerous_tx(signature: &str) -> ParsedTransaction {
        ParsedTransaction::new(signature).with_instruction(
            ParsedInstruction::new(
                crate::domain::known_programs::RAYDIUM_AMM_V4,
                Some("removeLiquidity"),
            )
            .with_info(serde_json::json!({ "mint": MINT })),
        )
    }

    fn monitor_with(
        stream: Arc<MockLogStream>,
        fetcher: Arc<MockTransactionFetcher>,
        store: Arc<MockTargetStore>,
        bus: EventBus,
    ) -> MempoolMonitor {
        let mut config = MonitorSection::default();
        config.fetch_retry_delay_ms = 1;
        MempoolMonitor::new(
            config,
            FiltersSection::default(),
            AnalyzerConfig::default(),
            stream,
            fetcher,
            store,
            bus,
        )
    }

    #[test]
    fn test_determine_priority_buckets() {
        let lines = |s: &str| vec![format!("Program log: Instruction: {s}")];
        assert_eq!(determine_priority(&lines("RemoveLiquidity")), EventPriority::Critical);
        assert_eq!(determine_priority(&lines("Withdraw")), EventPriority::Critical);
        assert_eq!(determine_priority(&lines("FreezeAccount")), EventPriority::High);
        assert_eq!(determine_priority(&lines("SetAuthority")), EventPriority::High);
        assert_eq!(determine_priority(&lines("Swap")), EventPriority::Normal);
        assert_eq!(determine_priority(&lines("Transfer")), EventPriority::Low);
    }

    #[test]
    fn test_priority_heap_orders_critical_first() {
        let mut heap = BinaryHeap::new();
        heap.push(PrioritizedEvent {
            priority: EventPriority::Normal,
            seq: 0,
            event: LogEvent::new("a".to_string(), vec![]),
        });
        heap.push(PrioritizedEvent {
            priority: EventPriority::Critical,
            seq: 1,
            event: LogEvent::new("b".to_string(), vec![]),
        });
        heap.push(PrioritizedEvent {
            priority: EventPriority::Critical,
            seq: 2,
            event: LogEvent::new("c".to_string(), vec![]),
        });

        assert_eq!(heap.pop().unwrap().event.signature, "b");
        assert_eq!(heap.pop().unwrap().event.signature, "c");
        assert_eq!(heap.pop().unwrap().event.signature, "a");
    }

    #[test]
    fn test_seen_signatures_bounded_fifo() {
        let mut seen = SeenSignatures::new(2);
        assert!(seen.insert("a"));
        assert!(!seen.insert("a"));
        assert!(seen.insert("b"));
        assert!(seen.insert("c"));
        // "a" was evicted
        assert!(seen.insert("a"));
    }

    #[test]
    fn test_is_base58_rejects_ambiguous_chars() {
        assert!(is_base58(MINT));
        assert!(!is_base58("0OIl"));
        assert!(!is_base58("has-dash"));
    }

    #[tokio::test]
    async fn test_start_requires_stream() {
        // A stream that refuses subscriptions leaves the monitor stopped
        struct DeadStream;
        #[async_trait::async_trait]
        impl LogStream for DeadStream {
            async fn connect(
                &self,
                _events: mpsc::Sender<LogEvent>,
            ) -> Result<(), StreamError> {
                Err(StreamError::Connection("refused".to_string()))
            }
            async fn subscribe_logs(&self, _program_id: &str) -> Result<u64, StreamError> {
                Err(StreamError::NotConnected)
            }
            async fn disconnect(&self) -> Result<(), StreamError> {
                Ok(())
            }
        }

        let failing = MempoolMonitor::new(
            MonitorSection::default(),
            FiltersSection::default(),
            AnalyzerConfig::default(),
            Arc::new(DeadStream),
            Arc::new(MockTransactionFetcher::new()),
            Arc::new(MockTargetStore::new()),
            EventBus::default(),
        );
        assert!(failing.start().await.is_err());
        assert_eq!(failing.state().await, MonitorState::Stopped);
    }

    #[tokio::test]
    async fn test_detection_pipeline_emits_threat() {
        let stream = Arc::new(MockLogStream::new());
        let fetcher =
            Arc::new(MockTransactionFetcher::new().with_transaction(dangerous_tx("Sig1")));
        let store = Arc::new(MockTargetStore::with_targets(vec![target()]));
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        let monitor = monitor_with(
            Arc::clone(&stream),
            Arc::clone(&fetcher),
            Arc::clone(&store),
            bus.clone(),
        );
        monitor.start().await.unwrap();
        assert_eq!(monitor.state().await, MonitorState::Running);
        assert_eq!(stream.subscribed_programs().len(), MONITORED_PROGRAMS.len());

        stream
            .emit(LogEvent::new(
                "Sig1".to_string(),
                vec![format!("Program log: RemoveLiquidity pool for {MINT}")],
            ))
            .await;

        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            SentinelEvent::ThreatDetected(e) => {
                assert_eq!(e.signature, "Sig1");
                assert_eq!(e.token_mint, MINT);
                assert_eq!(e.wallet_address, WALLET);
                assert_eq!(e.priority_fee_multiplier, 1.5);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        monitor.stop().await.unwrap();
        assert_eq!(monitor.state().await, MonitorState::Stopped);
    }

    #[tokio::test]
    async fn test_unwatched_logs_are_prefiltered() {
        let stream = Arc::new(MockLogStream::new());
        let fetcher = Arc::new(MockTransactionFetcher::new());
        let store = Arc::new(MockTargetStore::with_targets(vec![target()]));
        let monitor = monitor_with(
            Arc::clone(&stream),
            Arc::clone(&fetcher),
            store,
            EventBus::default(),
        );
        monitor.start().await.unwrap();

        // Mentions no watched identifier, so no fetch should happen
        stream
            .emit(LogEvent::new(
                "SigX".to_string(),
                vec!["Program log: RemoveLiquidity on some other pool".to_string()],
            ))
            .await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fetcher.fetch_count(), 0);

        monitor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_signatures_fetched_once() {
        let stream = Arc::new(MockLogStream::new());
        let fetcher =
            Arc::new(MockTransactionFetcher::new().with_transaction(dangerous_tx("Sig1")));
        let store = Arc::new(MockTargetStore::with_targets(vec![target()]));
        let monitor = monitor_with(
            Arc::clone(&stream),
            Arc::clone(&fetcher),
            store,
            EventBus::default(),
        );
        monitor.start().await.unwrap();

        let logs = vec![format!("Program log: RemoveLiquidity {MINT}")];
        stream.emit(LogEvent::new("Sig1".to_string(), logs.clone())).await;
        stream.emit(LogEvent::new("Sig1".to_string(), logs)).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(fetcher.fetch_count(), 1);
        monitor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_fetch_retries_transient_errors() {
        let stream = Arc::new(MockLogStream::new());
        let fetcher = Arc::new(
            MockTransactionFetcher::new()
                .with_transaction(dangerous_tx("Sig1"))
                .with_flaky("Sig1", 2),
        );
        let store = Arc::new(MockTargetStore::with_targets(vec![target()]));
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let monitor = monitor_with(
            Arc::clone(&stream),
            Arc::clone(&fetcher),
            store,
            bus.clone(),
        );
        monitor.start().await.unwrap();

        stream
            .emit(LogEvent::new(
                "Sig1".to_string(),
                vec![format!("Program log: RemoveLiquidity {MINT}")],
            ))
            .await;

        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, SentinelEvent::ThreatDetected(_)));
        assert_eq!(fetcher.fetch_count(), 3);
        monitor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_threshold_filters_low_risk() {
        // Target requires High; a large sell only reaches Medium
        let stream = Arc::new(MockLogStream::new());
        let sell_tx = ParsedTransaction::new("SigSell").with_instruction(
            ParsedInstruction::new(
                crate::domain::known_programs::RAYDIUM_AMM_V4,
                Some("swap"),
            )
            .with_info(serde_json::json!({
                "amountIn": 20_000_000_000u64,
                "mint": MINT,
            })),
        );
        let fetcher = Arc::new(MockTransactionFetcher::new().with_transaction(sell_tx));
        let store = Arc::new(MockTargetStore::with_targets(vec![target()]));
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let monitor = monitor_with(Arc::clone(&stream), fetcher, store, bus.clone());
        monitor.start().await.unwrap();

        stream
            .emit(LogEvent::new(
                "SigSell".to_string(),
                vec![format!("Program log: Instruction: Swap {MINT}")],
            ))
            .await;
        assert!(
            tokio::time::timeout(Duration::from_millis(150), rx.recv())
                .await
                .is_err()
        );
        monitor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_alerts_recorded_fire_and_forget() {
        let stream = Arc::new(MockLogStream::new());
        let fetcher =
            Arc::new(MockTransactionFetcher::new().with_transaction(dangerous_tx("Sig1")));
        let store = Arc::new(MockTargetStore::with_targets(vec![target()]));
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let monitor = monitor_with(
            Arc::clone(&stream),
            fetcher,
            Arc::clone(&store),
            bus.clone(),
        );
        monitor.start().await.unwrap();

        stream
            .emit(LogEvent::new(
                "Sig1".to_string(),
                vec![format!("Program log: RemoveLiquidity {MINT}")],
            ))
            .await;
        let _ = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await;
        // Let the spawned persistence task land
        tokio::time::sleep(Duration::from_millis(50)).await;

        let alerts = store.recorded_alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].signature, "Sig1");
        monitor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_unprotect_rebuilds_filters() {
        let stream = Arc::new(MockLogStream::new());
        let fetcher =
            Arc::new(MockTransactionFetcher::new().with_transaction(dangerous_tx("Sig1")));
        let store = Arc::new(MockTargetStore::with_targets(vec![target()]));
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let monitor = monitor_with(
            Arc::clone(&stream),
            Arc::clone(&fetcher),
            store,
            bus.clone(),
        );
        monitor.start().await.unwrap();

        monitor.unprotect(target()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        stream
            .emit(LogEvent::new(
                "Sig1".to_string(),
                vec![format!("Program log: RemoveLiquidity {MINT}")],
            ))
            .await;
        assert!(
            tokio::time::timeout(Duration::from_millis(150), rx.recv())
                .await
                .is_err()
        );
        assert_eq!(fetcher.fetch_count(), 0);
        monitor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let stream = Arc::new(MockLogStream::new());
        let fetcher =
            Arc::new(MockTransactionFetcher::new().with_transaction(dangerous_tx("Sig1")));
        let store = Arc::new(MockTargetStore::with_targets(vec![target()]));
        let bus = EventBus::default();
        let monitor = monitor_with(
            Arc::clone(&stream),
            Arc::clone(&fetcher),
            store,
            bus.clone(),
        );

        monitor.start().await.unwrap();
        monitor.stop().await.unwrap();
        assert_eq!(monitor.state().await, MonitorState::Stopped);

        // A stopped monitor starts again and still detects
        let mut rx = bus.subscribe();
        monitor.start().await.unwrap();
        assert_eq!(monitor.state().await, MonitorState::Running);

        stream
            .emit(LogEvent::new(
                "Sig1".to_string(),
                vec![format!("Program log: RemoveLiquidity {MINT}")],
            ))
            .await;
        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, SentinelEvent::ThreatDetected(_)));

        monitor.stop().await.unwrap();
        assert_eq!(monitor.state().await, MonitorState::Stopped);
    }

    #[tokio::test]
    async fn test_slow_fetch_does_not_block_later_events() {
        use crate::ports::FetchError;

        // Fetcher that stalls on one signature only
        struct StallingFetcher {
            slow_signature: String,
            delay: Duration,
            inner: MockTransactionFetcher,
        }

        #[async_trait::async_trait]
        impl TransactionFetcher for StallingFetcher {
            async fn fetch_parsed(
                &self,
                signature: &str,
            ) -> Result<ParsedTransaction, FetchError> {
                if signature == self.slow_signature {
                    tokio::time::sleep(self.delay).await;
                }
                self.inner.fetch_parsed(signature).await
            }
        }

        let fetcher = Arc::new(StallingFetcher {
            slow_signature: "SigSlow".to_string(),
            delay: Duration::from_millis(300),
            inner: MockTransactionFetcher::new()
                .with_transaction(dangerous_tx("SigSlow"))
                .with_transaction(dangerous_tx("SigFast")),
        });
        let stream = Arc::new(MockLogStream::new());
        let store = Arc::new(MockTargetStore::with_targets(vec![target()]));
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let monitor = MempoolMonitor::new(
            MonitorSection::default(),
            FiltersSection::default(),
            AnalyzerConfig::default(),
            Arc::clone(&stream) as Arc<dyn LogStream>,
            fetcher,
            store,
            bus.clone(),
        );
        monitor.start().await.unwrap();

        let logs = vec![format!("Program log: RemoveLiquidity {MINT}")];
        stream
            .emit(LogEvent::new("SigSlow".to_string(), logs.clone()))
            .await;
        stream.emit(LogEvent::new("SigFast".to_string(), logs)).await;

        // The fast transaction must not wait behind the stalled fetch
        let first = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match first {
            SentinelEvent::ThreatDetected(e) => assert_eq!(e.signature, "SigFast"),
            other => panic!("unexpected event: {other:?}"),
        }
        let second = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match second {
            SentinelEvent::ThreatDetected(e) => assert_eq!(e.signature, "SigSlow"),
            other => panic!("unexpected event: {other:?}"),
        }

        monitor.stop().await.unwrap();
    }
}
