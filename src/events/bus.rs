//! Broadcast Event Bus
//!
//! Fan-out channel connecting the mempool monitor to the frontrunner
//! and any other interested subscribers. Publishing is fire-and-forget:
//! a send with zero receivers is not an error, and a slow subscriber
//! that falls behind the channel capacity loses the oldest events
//! rather than stalling the detection path.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::domain::ThreatDetectedEvent;

/// Default bounded capacity per subscriber
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// Everything that flows over the bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SentinelEvent {
    /// A watched wallet/token pair is threatened
    ThreatDetected(ThreatDetectedEvent),
    /// A protective transaction confirmed
    ExecutionSuccess {
        token_mint: String,
        wallet_address: String,
        signature: String,
        confirmation_time_ms: u64,
        attempts_made: u32,
    },
    /// Every attempt for a protective transaction failed
    ExecutionFailed {
        token_mint: String,
        wallet_address: String,
        error: String,
        attempts_made: u32,
    },
}

/// Cloneable handle around a broadcast sender
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SentinelEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event; returns how many subscribers received it
    pub fn publish(&self, event: SentinelEvent) -> usize {
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            // No subscribers yet; the event is dropped by design of
            // the broadcast channel
            Err(_) => 0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SentinelEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ThreatAnalysis, ThreatType};

    fn threat_event() -> ThreatDetectedEvent {
        ThreatDetectedEvent::new(
            "Sig111".to_string(),
            "MintA".to_string(),
            "WalletA".to_string(),
            ThreatAnalysis::from_type(ThreatType::LiquidityRemoval, 0.9),
            3.0,
        )
    }

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        let delivered = bus.publish(SentinelEvent::ThreatDetected(threat_event()));
        assert_eq!(delivered, 2);

        assert!(matches!(
            rx1.recv().await.unwrap(),
            SentinelEvent::ThreatDetected(_)
        ));
        assert!(matches!(
            rx2.recv().await.unwrap(),
            SentinelEvent::ThreatDetected(_)
        ));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::default();
        assert_eq!(
            bus.publish(SentinelEvent::ExecutionFailed {
                token_mint: "MintA".to_string(),
                wallet_address: "WalletA".to_string(),
                error: "timeout".to_string(),
                attempts_made: 3,
            }),
            0
        );
    }

    #[tokio::test]
    async fn test_slow_subscriber_drops_oldest() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();

        for _ in 0..4 {
            bus.publish(SentinelEvent::ThreatDetected(threat_event()));
        }

        // The first recv on a lagged receiver reports the overflow
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(2))
        ));
        // The two newest events are still deliverable
        assert!(rx.recv().await.is_ok());
        assert!(rx.recv().await.is_ok());
    }
}
