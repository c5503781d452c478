//! File-Backed Stores
//!
//! JSON persistence for the protected-target watch list, a JSON-lines
//! alert audit trail, and a directory of pre-signed emergency
//! transactions keyed `wallet:token`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::domain::{ProtectedTarget, ThreatAlert};
use crate::ports::{
    CachedTransaction, CachedTxMetadata, StoreError, TargetStore, TargetUpdate, TransactionCache,
};

/// On-disk target record; `active` rows are the live watch list
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredTarget {
    #[serde(flatten)]
    target: ProtectedTarget,
    #[serde(default = "default_active")]
    active: bool,
}

fn default_active() -> bool {
    true
}

/// Target store over a single JSON array file
pub struct FileTargetStore {
    targets_path: PathBuf,
    alerts_path: PathBuf,
}

impl FileTargetStore {
    pub fn new(targets_path: impl AsRef<Path>, alerts_path: impl AsRef<Path>) -> Self {
        Self {
            targets_path: targets_path.as_ref().to_path_buf(),
            alerts_path: alerts_path.as_ref().to_path_buf(),
        }
    }

    async fn read_all(&self) -> Result<Vec<StoredTarget>, StoreError> {
        match tokio::fs::read_to_string(&self.targets_path).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            // A missing file is an empty watch list
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_all(&self, targets: &[StoredTarget]) -> Result<(), StoreError> {
        if let Some(parent) = self.targets_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(targets)?;
        tokio::fs::write(&self.targets_path, content).await?;
        Ok(())
    }
}

#[async_trait]
impl TargetStore for FileTargetStore {
    async fn load_active(&self) -> Result<Vec<ProtectedTarget>, StoreError> {
        let stored = self.read_all().await?;
        Ok(stored
            .into_iter()
            .filter(|s| s.active)
            .map(|s| s.target)
            .collect())
    }

    async fn update(&self, id: &str, update: TargetUpdate) -> Result<(), StoreError> {
        let mut stored = self.read_all().await?;
        let entry = stored
            .iter_mut()
            .find(|s| s.target.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if let Some(threshold) = update.risk_threshold {
            entry.target.risk_threshold = threshold;
        }
        if let Some(multiplier) = update.priority_fee_multiplier {
            entry.target.priority_fee_multiplier = multiplier;
        }
        if let Some(pool) = update.pool_address {
            entry.target.pool_address = Some(pool);
        }
        if let Some(active) = update.active {
            entry.active = active;
        }
        debug!(id, "Target updated");
        self.write_all(&stored).await
    }

    async fn record_alert(&self, alert: &ThreatAlert) -> Result<(), StoreError> {
        if let Some(parent) = self.alerts_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut line = serde_json::to_string(alert)?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.alerts_path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }
}

/// Serialized form of one cached transaction file
#[derive(Debug, Serialize, Deserialize)]
struct CachedTxFile {
    /// Signed transaction bytes, base64
    transaction: String,
    priority_fee: u64,
    compute_units: u32,
}

/// Pre-signed transaction cache: one JSON file per `wallet:token` key
pub struct FileTransactionCache {
    dir: PathBuf,
}

impl FileTransactionCache {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // ':' is path-hostile on some filesystems
        self.dir.join(format!("{}.json", key.replace(':', "_")))
    }

    /// Write one cache entry; used by provisioning tooling and tests
    pub async fn put_transaction(
        &self,
        key: &str,
        cached: &CachedTransaction,
    ) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let file = CachedTxFile {
            transaction: BASE64.encode(&cached.transaction),
            priority_fee: cached.metadata.priority_fee,
            compute_units: cached.metadata.compute_units,
        };
        let content = serde_json::to_string_pretty(&file)?;
        tokio::fs::write(self.path_for(key), content).await?;
        Ok(())
    }
}

#[async_trait]
impl TransactionCache for FileTransactionCache {
    async fn get_transaction(&self, key: &str) -> Option<CachedTransaction> {
        let path = self.path_for(key);
        let content = tokio::fs::read_to_string(&path).await.ok()?;
        let file: CachedTxFile = match serde_json::from_str(&content) {
            Ok(file) => file,
            Err(e) => {
                warn!(key, error = %e, "Malformed cached transaction file");
                return None;
            }
        };
        let transaction = match BASE64.decode(&file.transaction) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key, error = %e, "Cached transaction is not valid base64");
                return None;
            }
        };
        Some(CachedTransaction {
            transaction,
            metadata: CachedTxMetadata {
                priority_fee: file.priority_fee,
                compute_units: file.compute_units,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RiskLevel, ThreatType};
    use tempfile::TempDir;

    fn target(id: &str) -> ProtectedTarget {
        ProtectedTarget {
            id: id.to_string(),
            token_mint: "MintA".to_string(),
            wallet_address: "WalletA".to_string(),
            pool_address: None,
            risk_threshold: RiskLevel::High,
            priority_fee_multiplier: 2.0,
        }
    }

    fn store_in(dir: &TempDir) -> FileTargetStore {
        FileTargetStore::new(
            dir.path().join("targets.json"),
            dir.path().join("alerts.jsonl"),
        )
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_watch_list() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        assert!(store.load_active().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_active_filters_inactive() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store
            .write_all(&[
                StoredTarget {
                    target: target("t1"),
                    active: true,
                },
                StoredTarget {
                    target: target("t2"),
                    active: false,
                },
            ])
            .await
            .unwrap();

        let active = store.load_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "t1");
    }

    #[tokio::test]
    async fn test_update_applies_partial_fields() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store
            .write_all(&[StoredTarget {
                target: target("t1"),
                active: true,
            }])
            .await
            .unwrap();

        store
            .update(
                "t1",
                TargetUpdate {
                    risk_threshold: Some(RiskLevel::Critical),
                    priority_fee_multiplier: Some(3.0),
                    ..TargetUpdate::default()
                },
            )
            .await
            .unwrap();

        let active = store.load_active().await.unwrap();
        assert_eq!(active[0].risk_threshold, RiskLevel::Critical);
        assert_eq!(active[0].priority_fee_multiplier, 3.0);
        // Untouched field survives
        assert_eq!(active[0].wallet_address, "WalletA");
    }

    #[tokio::test]
    async fn test_update_unknown_id_fails() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let result = store.update("missing", TargetUpdate::default()).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_deactivation_via_update() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store
            .write_all(&[StoredTarget {
                target: target("t1"),
                active: true,
            }])
            .await
            .unwrap();

        store
            .update(
                "t1",
                TargetUpdate {
                    active: Some(false),
                    ..TargetUpdate::default()
                },
            )
            .await
            .unwrap();
        assert!(store.load_active().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_alerts_append_as_json_lines() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let alert = ThreatAlert {
            signature: "Sig1".to_string(),
            token_mint: "MintA".to_string(),
            wallet_address: "WalletA".to_string(),
            threat_type: ThreatType::LiquidityRemoval,
            risk_level: RiskLevel::Critical,
            confidence: 0.9,
            detected_at_ms: 1,
        };
        store.record_alert(&alert).await.unwrap();
        store.record_alert(&alert).await.unwrap();

        let content = tokio::fs::read_to_string(dir.path().join("alerts.jsonl"))
            .await
            .unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: ThreatAlert = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.signature, "Sig1");
    }

    #[tokio::test]
    async fn test_tx_cache_round_trip() {
        let dir = TempDir::new().unwrap();
        let cache = FileTransactionCache::new(dir.path().join("tx_cache"));
        let cached = CachedTransaction {
            transaction: vec![9, 8, 7, 6],
            metadata: CachedTxMetadata {
                priority_fee: 5_000,
                compute_units: 150_000,
            },
        };
        cache.put_transaction("WalletA:MintA", &cached).await.unwrap();

        let loaded = cache.get_transaction("WalletA:MintA").await.unwrap();
        assert_eq!(loaded.transaction, vec![9, 8, 7, 6]);
        assert_eq!(loaded.metadata.priority_fee, 5_000);
        assert_eq!(loaded.metadata.compute_units, 150_000);
    }

    #[tokio::test]
    async fn test_tx_cache_miss_is_none() {
        let dir = TempDir::new().unwrap();
        let cache = FileTransactionCache::new(dir.path().join("tx_cache"));
        assert!(cache.get_transaction("WalletB:MintB").await.is_none());
    }

    #[tokio::test]
    async fn test_tx_cache_rejects_malformed_file() {
        let dir = TempDir::new().unwrap();
        let cache_dir = dir.path().join("tx_cache");
        tokio::fs::create_dir_all(&cache_dir).await.unwrap();
        tokio::fs::write(cache_dir.join("WalletA_MintA.json"), "not json")
            .await
            .unwrap();

        let cache = FileTransactionCache::new(&cache_dir);
        assert!(cache.get_transaction("WalletA:MintA").await.is_none());
    }
}
