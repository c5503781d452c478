//! Watch Filters
//!
//! Three independent bloom filters (tokens, wallets, pools) giving O(1)
//! "definitely not watched" rejection before any transaction fetch or
//! analysis. No false negatives; a positive is only a hint and must be
//! confirmed against the exact target registry.
//!
//! Standard filters cannot remove entries, so unprotecting a target
//! leaves a stale positive behind. Deletion is handled by rebuilding all
//! three filters from the registry (`rebuild_from`).

use bloomfilter::Bloom;

use super::registry::ProtectedTarget;

/// Default expected element count per filter
pub const DEFAULT_EXPECTED_ITEMS: usize = 10_000;
/// Default false-positive rate
pub const DEFAULT_FP_RATE: f64 = 0.01;

/// Which namespace a candidate identifier matched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchNamespace {
    Token,
    Wallet,
    Pool,
}

/// Three-namespace probabilistic watch set
pub struct WatchFilters {
    expected_items: usize,
    fp_rate: f64,
    tokens: Bloom<String>,
    wallets: Bloom<String>,
    pools: Bloom<String>,
}

impl WatchFilters {
    pub fn new(expected_items: usize, fp_rate: f64) -> Self {
        Self {
            expected_items,
            fp_rate,
            tokens: Bloom::new_for_fp_rate(expected_items, fp_rate),
            wallets: Bloom::new_for_fp_rate(expected_items, fp_rate),
            pools: Bloom::new_for_fp_rate(expected_items, fp_rate),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_EXPECTED_ITEMS, DEFAULT_FP_RATE)
    }

    /// Add every identifier of a protected target to its namespace filter
    pub fn add_target(&mut self, target: &ProtectedTarget) {
        self.tokens.set(&target.token_mint);
        self.wallets.set(&target.wallet_address);
        if let Some(pool) = &target.pool_address {
            self.pools.set(pool);
        }
    }

    pub fn add_token(&mut self, mint: &str) {
        self.tokens.set(&mint.to_string());
    }

    pub fn add_wallet(&mut self, wallet: &str) {
        self.wallets.set(&wallet.to_string());
    }

    pub fn add_pool(&mut self, pool: &str) {
        self.pools.set(&pool.to_string());
    }

    pub fn contains_token(&self, mint: &str) -> bool {
        self.tokens.check(&mint.to_string())
    }

    pub fn contains_wallet(&self, wallet: &str) -> bool {
        self.wallets.check(&wallet.to_string())
    }

    pub fn contains_pool(&self, pool: &str) -> bool {
        self.pools.check(&pool.to_string())
    }

    /// First namespace the key matches, if any
    pub fn match_namespace(&self, key: &str) -> Option<WatchNamespace> {
        let key = key.to_string();
        if self.tokens.check(&key) {
            Some(WatchNamespace::Token)
        } else if self.wallets.check(&key) {
            Some(WatchNamespace::Wallet)
        } else if self.pools.check(&key) {
            Some(WatchNamespace::Pool)
        } else {
            None
        }
    }

    /// Whether the key matches any namespace
    pub fn contains_any(&self, key: &str) -> bool {
        self.match_namespace(key).is_some()
    }

    /// Rebuild all three filters from the current registry contents.
    /// Clears stale positives left behind by removed targets.
    pub fn rebuild_from<'a>(&mut self, targets: impl Iterator<Item = &'a ProtectedTarget>) {
        self.tokens = Bloom::new_for_fp_rate(self.expected_items, self.fp_rate);
        self.wallets = Bloom::new_for_fp_rate(self.expected_items, self.fp_rate);
        self.pools = Bloom::new_for_fp_rate(self.expected_items, self.fp_rate);
        for target in targets {
            self.add_target(target);
        }
    }
}
