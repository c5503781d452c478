//! Solana WebSocket Log Stream
//!
//! `logsSubscribe` client over tokio-tungstenite. The connection task
//! owns the socket, answers pings, forwards log notifications into the
//! monitor's channel, and reconnects with capped exponential backoff,
//! replaying every active subscription after each reconnect.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::ports::{LogEvent, LogStream, StreamError};

/// Reconnection delay base (exponential backoff)
const RECONNECT_BASE_DELAY_MS: u64 = 1000;
/// Maximum reconnection delay
const MAX_RECONNECT_DELAY_MS: u64 = 30_000;
/// Capacity of the internal subscribe-request channel
const REQUEST_CHANNEL_CAPACITY: usize = 64;

type WsSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Deserialize)]
struct LogsNotification {
    method: String,
    params: LogsParams,
}

#[derive(Debug, Deserialize)]
struct LogsParams {
    result: LogsResult,
}

#[derive(Debug, Deserialize)]
struct LogsResult {
    value: LogsValue,
}

#[derive(Debug, Deserialize)]
struct LogsValue {
    signature: String,
    logs: Vec<String>,
    #[serde(default)]
    err: Option<serde_json::Value>,
}

/// Websocket-backed log stream
pub struct WsLogStream {
    ws_url: String,
    commitment: String,
    subscriptions: Mutex<Vec<String>>,
    request_tx: Mutex<Option<mpsc::Sender<String>>>,
    next_id: AtomicU64,
}

impl WsLogStream {
    pub fn new(ws_url: impl Into<String>, commitment: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            commitment: commitment.into(),
            subscriptions: Mutex::new(Vec::new()),
            request_tx: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    fn request_tx_guard(&self) -> MutexGuard<'_, Option<mpsc::Sender<String>>> {
        self.request_tx.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscriptions_guard(&self) -> MutexGuard<'_, Vec<String>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl LogStream for WsLogStream {
    async fn connect(&self, events: mpsc::Sender<LogEvent>) -> Result<(), StreamError> {
        info!(url = %self.ws_url, "Connecting to Solana websocket");
        let (socket, _) = connect_async(&self.ws_url)
            .await
            .map_err(|e| StreamError::Connection(e.to_string()))?;
        info!("Websocket connected");

        let (request_tx, request_rx) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
        *self.request_tx_guard() = Some(request_tx);

        let task = ConnectionTask {
            ws_url: self.ws_url.clone(),
            commitment: self.commitment.clone(),
            events,
        };
        tokio::spawn(task.run(socket, request_rx));
        Ok(())
    }

    async fn subscribe_logs(&self, program_id: &str) -> Result<u64, StreamError> {
        let tx = self
            .request_tx_guard()
            .clone()
            .ok_or(StreamError::NotConnected)?;
        self.subscriptions_guard().push(program_id.to_string());
        tx.send(program_id.to_string())
            .await
            .map_err(|_| StreamError::NotConnected)?;
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn disconnect(&self) -> Result<(), StreamError> {
        // Dropping the request sender ends the connection task
        self.request_tx_guard().take();
        self.subscriptions_guard().clear();
        Ok(())
    }
}

/// State owned by the spawned connection loop
struct ConnectionTask {
    ws_url: String,
    commitment: String,
    events: mpsc::Sender<LogEvent>,
}

impl ConnectionTask {
    async fn run(self, initial: WsSocket, mut request_rx: mpsc::Receiver<String>) {
        let mut socket = Some(initial);
        let mut subscribed: Vec<String> = Vec::new();
        let mut backoff = RECONNECT_BASE_DELAY_MS;
        let mut request_id = 0u64;

        loop {
            let ws = match socket.take() {
                Some(ws) => ws,
                None => match connect_async(&self.ws_url).await {
                    Ok((ws, _)) => {
                        info!("Websocket reconnected");
                        backoff = RECONNECT_BASE_DELAY_MS;
                        ws
                    }
                    Err(e) => {
                        warn!(error = %e, delay_ms = backoff, "Websocket reconnect failed");
                        tokio::time::sleep(Duration::from_millis(backoff)).await;
                        backoff = (backoff * 2).min(MAX_RECONNECT_DELAY_MS);
                        continue;
                    }
                },
            };

            let (mut write, mut read) = ws.split();

            // Replay subscriptions after a reconnect
            for program in &subscribed {
                request_id += 1;
                let frame = subscribe_frame(request_id, program, &self.commitment);
                if let Err(e) = write.send(Message::Text(frame)).await {
                    warn!(error = %e, "Subscription replay failed");
                }
            }

            let disconnected = loop {
                tokio::select! {
                    request = request_rx.recv() => match request {
                        Some(program) => {
                            request_id += 1;
                            let frame = subscribe_frame(request_id, &program, &self.commitment);
                            if let Err(e) = write.send(Message::Text(frame)).await {
                                warn!(error = %e, program, "Subscribe send failed");
                                subscribed.push(program);
                                break false;
                            }
                            debug!(program, "Subscribed to program logs");
                            subscribed.push(program);
                        }
                        // The stream handle disconnected; close and stop
                        None => {
                            let _ = write.send(Message::Close(None)).await;
                            break true;
                        }
                    },
                    msg = read.next() => match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(event) = parse_notification(&text) {
                                if self.events.send(event).await.is_err() {
                                    break true;
                                }
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            let _ = write.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(_))) => {
                            warn!("Websocket closed by server");
                            break false;
                        }
                        Some(Err(e)) => {
                            error!(error = %e, "Websocket read error");
                            break false;
                        }
                        None => break false,
                        _ => {}
                    }
                }
            };

            if disconnected {
                debug!("Websocket task exiting");
                return;
            }
        }
    }
}

fn subscribe_frame(id: u64, program_id: &str, commitment: &str) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "logsSubscribe",
        "params": [
            { "mentions": [program_id] },
            { "commitment": commitment }
        ]
    })
    .to_string()
}

/// Parse one websocket frame into a log event. Failed transactions and
/// non-notification frames (subscription confirmations, errors) yield
/// None.
fn parse_notification(text: &str) -> Option<LogEvent> {
    let notification: LogsNotification = serde_json::from_str(text).ok()?;
    if notification.method != "logsNotification" {
        return None;
    }
    let value = notification.params.result.value;
    if value.err.is_some() {
        return None;
    }
    Some(LogEvent::new(value.signature, value.logs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_frame_shape() {
        let frame = subscribe_frame(3, "Program111", "processed");
        let parsed: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(parsed["method"], "logsSubscribe");
        assert_eq!(parsed["id"], 3);
        assert_eq!(parsed["params"][0]["mentions"][0], "Program111");
        assert_eq!(parsed["params"][1]["commitment"], "processed");
    }

    #[test]
    fn test_parse_notification() {
        let text = r#"{
            "jsonrpc": "2.0",
            "method": "logsNotification",
            "params": {
                "result": {
                    "context": { "slot": 100 },
                    "value": {
                        "signature": "Sig111",
                        "logs": ["Program log: Instruction: Swap"],
                        "err": null
                    }
                },
                "subscription": 1
            }
        }"#;
        let event = parse_notification(text).unwrap();
        assert_eq!(event.signature, "Sig111");
        assert_eq!(event.logs.len(), 1);
    }

    #[test]
    fn test_parse_skips_failed_transactions() {
        let text = r#"{
            "jsonrpc": "2.0",
            "method": "logsNotification",
            "params": {
                "result": {
                    "value": {
                        "signature": "SigErr",
                        "logs": [],
                        "err": { "InstructionError": [0, "Custom"] }
                    }
                },
                "subscription": 1
            }
        }"#;
        assert!(parse_notification(text).is_none());
    }

    #[test]
    fn test_parse_skips_subscription_confirmations() {
        let text = r#"{ "jsonrpc": "2.0", "result": 42, "id": 1 }"#;
        assert!(parse_notification(text).is_none());
    }

    #[tokio::test]
    async fn test_subscribe_before_connect_fails() {
        let stream = WsLogStream::new("wss://localhost:1", "processed");
        assert!(matches!(
            stream.subscribe_logs("Program111").await,
            Err(StreamError::NotConnected)
        ));
    }
}
