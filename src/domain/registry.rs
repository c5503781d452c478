//! Protected Target Registry
//!
//! Exact-membership registry of watch entries, keyed by token mint. A
//! token may be protected for multiple wallets. Owned and mutated
//! exclusively by the mempool monitor; bloom-filter positives fall
//! through to this registry for the real monitoring decision.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::threat::RiskLevel;

/// Lower clamp for the user fee multiplier
pub const MIN_FEE_MULTIPLIER: f64 = 1.0;
/// Upper clamp for the user fee multiplier
pub const MAX_FEE_MULTIPLIER: f64 = 10.0;

/// One watch entry: a (token, wallet) pair with its protection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectedTarget {
    /// Store identifier, used for update calls
    pub id: String,
    /// Token mint being protected
    pub token_mint: String,
    /// Wallet holding the token
    pub wallet_address: String,
    /// Known pool for the token, if any
    #[serde(default)]
    pub pool_address: Option<String>,
    /// Minimum risk level that triggers the protective execution
    pub risk_threshold: RiskLevel,
    /// User fee multiplier, clamped to [1.0, 10.0] on read
    pub priority_fee_multiplier: f64,
}

impl ProtectedTarget {
    /// Fee multiplier with the configured clamp applied
    pub fn clamped_multiplier(&self) -> f64 {
        self.priority_fee_multiplier
            .clamp(MIN_FEE_MULTIPLIER, MAX_FEE_MULTIPLIER)
    }

    /// Whether a threat at `level` crosses this target's threshold
    pub fn triggered_by(&self, level: RiskLevel) -> bool {
        level >= self.risk_threshold
    }
}

/// Registry of protected targets keyed by token mint
#[derive(Debug, Default, Clone)]
pub struct TargetRegistry {
    by_mint: HashMap<String, Vec<ProtectedTarget>>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for the target's (token, wallet) pair
    pub fn insert(&mut self, target: ProtectedTarget) {
        let entries = self.by_mint.entry(target.token_mint.clone()).or_default();
        if let Some(existing) = entries
            .iter_mut()
            .find(|t| t.wallet_address == target.wallet_address)
        {
            *existing = target;
        } else {
            entries.push(target);
        }
    }

    /// Remove the entry for a (token, wallet) pair. Returns true if removed.
    pub fn remove(&mut self, token_mint: &str, wallet_address: &str) -> bool {
        let Some(entries) = self.by_mint.get_mut(token_mint) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|t| t.wallet_address != wallet_address);
        let removed = entries.len() < before;
        if entries.is_empty() {
            self.by_mint.remove(token_mint);
        }
        removed
    }

    /// All targets protecting a token mint
    pub fn targets_for(&self, token_mint: &str) -> &[ProtectedTarget] {
        self.by_mint
            .get(token_mint)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether any wallet protects this mint
    pub fn contains_token(&self, token_mint: &str) -> bool {
        self.by_mint.contains_key(token_mint)
    }

    /// Iterator over every registered target
    pub fn iter(&self) -> impl Iterator<Item = &ProtectedTarget> {
        self.by_mint.values().flatten()
    }

    /// Total number of (token, wallet) entries
    pub fn len(&self) -> usize {
        self.by_mint.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_mint.is_empty()
    }

    /// Number of distinct protected mints
    pub fn token_count(&self) -> usize {
        self.by_mint.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(mint: &str, wallet: &str) -> ProtectedTarget {
        ProtectedTarget {
            id: format!("{mint}-{wallet}"),
            token_mint: mint.to_string(),
            wallet_address: wallet.to_string(),
            pool_address: None,
            risk_threshold: RiskLevel::Medium,
            priority_fee_multiplier: 1.5,
        }
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut reg = TargetRegistry::new();
        reg.insert(target("MintA", "Wallet1"));
        reg.insert(target("MintA", "Wallet2"));
        reg.insert(target("MintB", "Wallet1"));

        assert_eq!(reg.len(), 3);
        assert_eq!(reg.token_count(), 2);
        assert_eq!(reg.targets_for("MintA").len(), 2);
        assert!(reg.contains_token("MintB"));
        assert!(!reg.contains_token("MintC"));
    }

    #[test]
    fn test_insert_replaces_same_pair() {
        let mut reg = TargetRegistry::new();
        reg.insert(target("MintA", "Wallet1"));

        let mut updated = target("MintA", "Wallet1");
        updated.priority_fee_multiplier = 4.0;
        reg.insert(updated);

        assert_eq!(reg.len(), 1);
        assert_eq!(reg.targets_for("MintA")[0].priority_fee_multiplier, 4.0);
    }

    #[test]
    fn test_remove() {
        let mut reg = TargetRegistry::new();
        reg.insert(target("MintA", "Wallet1"));
        reg.insert(target("MintA", "Wallet2"));

        assert!(reg.remove("MintA", "Wallet1"));
        assert!(!reg.remove("MintA", "Wallet1"));
        assert_eq!(reg.targets_for("MintA").len(), 1);

        assert!(reg.remove("MintA", "Wallet2"));
        // Empty mint entry is dropped entirely
        assert!(!reg.contains_token("MintA"));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_multiplier_clamp() {
        let mut t = target("MintA", "Wallet1");
        t.priority_fee_multiplier = 25.0;
        assert_eq!(t.clamped_multiplier(), 10.0);
        t.priority_fee_multiplier = 0.2;
        assert_eq!(t.clamped_multiplier(), 1.0);
        t.priority_fee_multiplier = 2.5;
        assert_eq!(t.clamped_multiplier(), 2.5);
    }

    #[test]
    fn test_threshold_trigger() {
        let mut t = target("MintA", "Wallet1");
        t.risk_threshold = RiskLevel::High;
        assert!(t.triggered_by(RiskLevel::Critical));
        assert!(t.triggered_by(RiskLevel::High));
        assert!(!t.triggered_by(RiskLevel::Medium));
    }
}
