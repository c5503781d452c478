//! Ingestion ports: the realtime log stream and the parsed-transaction
//! fetcher behind it.

use std::time::Instant;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use super::models::ParsedTransaction;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("connection: {0}")]
    Connection(String),

    #[error("not connected")]
    NotConnected,

    #[error("subscription for {program}: {reason}")]
    Subscription { program: String, reason: String },
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transaction {0} not found")]
    NotFound(String),

    #[error("rpc: {0}")]
    Rpc(String),

    #[error("fetch timed out")]
    Timeout,
}

/// One log notification from a subscribed program
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub signature: String,
    pub logs: Vec<String>,
    /// Arrival time, for detection latency accounting
    pub received_at: Instant,
}

impl LogEvent {
    pub fn new(signature: String, logs: Vec<String>) -> Self {
        Self {
            signature,
            logs,
            received_at: Instant::now(),
        }
    }
}

/// Realtime program-log subscription source. Events flow out through
/// the channel handed to `connect`; the stream owns reconnection.
#[async_trait]
pub trait LogStream: Send + Sync {
    /// Open the underlying connection and start delivering events into
    /// `events`
    async fn connect(&self, events: mpsc::Sender<LogEvent>) -> Result<(), StreamError>;

    /// Subscribe to logs mentioning one program; returns the
    /// subscription id
    async fn subscribe_logs(&self, program_id: &str) -> Result<u64, StreamError>;

    async fn disconnect(&self) -> Result<(), StreamError>;
}

/// Fetch of the full parsed transaction behind a log signature
#[async_trait]
pub trait TransactionFetcher: Send + Sync {
    async fn fetch_parsed(&self, signature: &str) -> Result<ParsedTransaction, FetchError>;
}
