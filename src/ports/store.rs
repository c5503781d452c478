//! Persistence ports: protected targets, alert history, and the
//! pre-signed transaction cache.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{ProtectedTarget, RiskLevel, ThreatAlert};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("target not found: {0}")]
    NotFound(String),

    #[error("storage io: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store backend: {0}")]
    Backend(String),
}

/// Partial update applied to a stored target; None fields are left
/// untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetUpdate {
    pub risk_threshold: Option<RiskLevel>,
    pub priority_fee_multiplier: Option<f64>,
    pub pool_address: Option<String>,
    pub active: Option<bool>,
}

/// Incremental watch-list change pushed to the monitor at runtime
#[derive(Debug, Clone)]
pub enum TargetChange {
    Insert(ProtectedTarget),
    Delete(ProtectedTarget),
}

/// Source of truth for the protected-target watch list plus the alert
/// audit trail
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// Targets currently marked active
    async fn load_active(&self) -> Result<Vec<ProtectedTarget>, StoreError>;

    /// Apply a partial update to one target by id
    async fn update(&self, id: &str, update: TargetUpdate) -> Result<(), StoreError>;

    /// Append one alert record. Called fire-and-forget from the
    /// detection path; failures are logged, never propagated there.
    async fn record_alert(&self, alert: &ThreatAlert) -> Result<(), StoreError>;
}

/// Metadata signed into a cached emergency transaction
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CachedTxMetadata {
    pub priority_fee: u64,
    pub compute_units: u32,
}

/// A pre-signed emergency-sell transaction, keyed by wallet:token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedTransaction {
    /// Fully serialized, signed transaction bytes
    pub transaction: Vec<u8>,
    pub metadata: CachedTxMetadata,
}

/// Lookup for pre-signed protective transactions
#[async_trait]
pub trait TransactionCache: Send + Sync {
    /// Fetch the cached transaction for a `wallet:token` key, if any
    async fn get_transaction(&self, key: &str) -> Option<CachedTransaction>;
}
