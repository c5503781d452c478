//! Pool Account Decoders
//!
//! Turn raw on-chain pool account bytes into normalized liquidity and
//! pricing facts for risk scoring. A closed set of venue decoders is
//! dispatched through a registry: program-id lookup first, then
//! try-in-order over every registered decoder. Unrecognized account
//! shapes never fail hard; they degrade to an estimated fallback.

pub mod pump_fun;
pub mod raydium;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

pub use pump_fun::PumpFunDecoder;
pub use raydium::RaydiumAmmDecoder;

/// Lamports per SOL
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Default SOL/USD price constant used for liquidity estimation.
/// A tunable, not an oracle; see `[pricing]` config.
pub const DEFAULT_SOL_PRICE_USD: f64 = 150.0;

/// Raw pool account as fetched from the chain
#[derive(Debug, Clone)]
pub struct PoolAccount {
    pub data: Vec<u8>,
    /// Native balance of the account, used for the degraded fallback
    /// liquidity estimate
    pub lamports: u64,
}

impl PoolAccount {
    pub fn new(data: Vec<u8>, lamports: u64) -> Self {
        Self { data, lamports }
    }
}

/// Venue tag on decoded pool metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolVenue {
    RaydiumAmm,
    PumpFun,
    Unknown,
}

impl PoolVenue {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolVenue::RaydiumAmm => "raydium_amm",
            PoolVenue::PumpFun => "pump_fun",
            PoolVenue::Unknown => "unknown",
        }
    }
}

/// Normalized decode result. Produced fresh per decode call and never
/// cached by the decoder itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolMetadata {
    pub pool_address: String,
    pub token_mint: String,
    pub quote_mint: String,
    /// USD-estimated liquidity; zero where the layout alone cannot
    /// provide it (Raydium vault balances live elsewhere)
    pub liquidity_usd: f64,
    pub program_id: String,
    pub venue: PoolVenue,
    /// Venue-specific facts, e.g. bonding-curve reserves
    #[serde(default)]
    pub additional_data: serde_json::Value,
}

/// One registered venue decoder
#[derive(Debug, Clone)]
pub enum PoolDecoder {
    RaydiumAmm(RaydiumAmmDecoder),
    PumpFun(PumpFunDecoder),
}

impl PoolDecoder {
    /// Program this decoder handles
    pub fn program_id(&self) -> &'static str {
        match self {
            PoolDecoder::RaydiumAmm(d) => d.program_id(),
            PoolDecoder::PumpFun(d) => d.program_id(),
        }
    }

    pub fn venue(&self) -> PoolVenue {
        match self {
            PoolDecoder::RaydiumAmm(_) => PoolVenue::RaydiumAmm,
            PoolDecoder::PumpFun(_) => PoolVenue::PumpFun,
        }
    }

    /// Cheap shape check, typically a byte-length range
    pub fn can_decode(&self, account: &PoolAccount) -> bool {
        match self {
            PoolDecoder::RaydiumAmm(d) => d.can_decode(account),
            PoolDecoder::PumpFun(d) => d.can_decode(account),
        }
    }

    /// Structural parse; None means "not mine, try the next decoder"
    pub fn decode(&self, account: &PoolAccount, pool_address: &str) -> Option<PoolMetadata> {
        match self {
            PoolDecoder::RaydiumAmm(d) => d.decode(account, pool_address),
            PoolDecoder::PumpFun(d) => d.decode(account, pool_address),
        }
    }
}

/// Decode counters exposed for observability
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DecodeStats {
    pub successful: u64,
    pub failed: u64,
    pub unknown: u64,
    pub registered_decoders: usize,
}

/// Registry of venue decoders with program-id dispatch and a degraded
/// fallback for unrecognized shapes
pub struct DecoderRegistry {
    decoders: Vec<PoolDecoder>,
    by_program: HashMap<String, usize>,
    sol_price_usd: f64,
    unknown_pools: Mutex<HashSet<String>>,
    successful: AtomicU64,
    failed: AtomicU64,
    unknown: AtomicU64,
}

impl DecoderRegistry {
    pub fn new(sol_price_usd: f64) -> Self {
        Self {
            decoders: Vec::new(),
            by_program: HashMap::new(),
            sol_price_usd,
            unknown_pools: Mutex::new(HashSet::new()),
            successful: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            unknown: AtomicU64::new(0),
        }
    }

    /// Registry preloaded with every known venue decoder
    pub fn with_default_decoders(sol_price_usd: f64) -> Self {
        let mut registry = Self::new(sol_price_usd);
        registry.register(PoolDecoder::RaydiumAmm(RaydiumAmmDecoder::new()));
        registry.register(PoolDecoder::PumpFun(PumpFunDecoder::new(sol_price_usd)));
        registry
    }

    pub fn register(&mut self, decoder: PoolDecoder) {
        self.by_program
            .insert(decoder.program_id().to_string(), self.decoders.len());
        self.decoders.push(decoder);
    }

    /// Decode raw pool account bytes. Always yields a metadata object:
    /// unmatched shapes produce the degraded `unknown` fallback with
    /// liquidity estimated from the account's native balance.
    pub fn decode(
        &self,
        account: &PoolAccount,
        pool_address: &str,
        program_id: Option<&str>,
    ) -> PoolMetadata {
        let mut attempted_parse = false;

        // Known program first
        let preferred = program_id.and_then(|p| self.by_program.get(p)).copied();
        if let Some(idx) = preferred {
            let decoder = &self.decoders[idx];
            if decoder.can_decode(account) {
                attempted_parse = true;
                if let Some(metadata) = decoder.decode(account, pool_address) {
                    self.successful.fetch_add(1, Ordering::Relaxed);
                    return metadata;
                }
            }
        }

        // Try-in-order over the rest
        for (idx, decoder) in self.decoders.iter().enumerate() {
            if Some(idx) == preferred || !decoder.can_decode(account) {
                continue;
            }
            attempted_parse = true;
            if let Some(metadata) = decoder.decode(account, pool_address) {
                self.successful.fetch_add(1, Ordering::Relaxed);
                return metadata;
            }
        }

        if attempted_parse {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.unknown.fetch_add(1, Ordering::Relaxed);
        self.record_unknown(pool_address);
        self.fallback_metadata(account, pool_address, program_id)
    }

    /// Degraded fallback for accounts of unrecognized shape
    fn fallback_metadata(
        &self,
        account: &PoolAccount,
        pool_address: &str,
        program_id: Option<&str>,
    ) -> PoolMetadata {
        let liquidity_usd =
            account.lamports as f64 / LAMPORTS_PER_SOL as f64 * self.sol_price_usd;
        PoolMetadata {
            pool_address: pool_address.to_string(),
            token_mint: "unknown".to_string(),
            quote_mint: "unknown".to_string(),
            liquidity_usd,
            program_id: program_id.unwrap_or("unknown").to_string(),
            venue: PoolVenue::Unknown,
            additional_data: serde_json::json!({
                "data_len": account.data.len(),
                "lamports": account.lamports,
            }),
        }
    }

    /// Record an unknown pool address once, deduplicated by address
    fn record_unknown(&self, pool_address: &str) {
        if let Ok(mut unknown) = self.unknown_pools.lock() {
            if unknown.insert(pool_address.to_string()) {
                tracing::info!(pool = pool_address, "No decoder matched pool account shape");
            }
        }
    }

    /// Addresses seen with no matching decoder
    pub fn unknown_pool_count(&self) -> usize {
        self.unknown_pools.lock().map(|u| u.len()).unwrap_or(0)
    }

    pub fn stats(&self) -> DecodeStats {
        DecodeStats {
            successful: self.successful.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            unknown: self.unknown.load(Ordering::Relaxed),
            registered_decoders: self.decoders.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::known_programs::{PUMP_FUN_PROGRAM, RAYDIUM_AMM_V4};

    fn registry() -> DecoderRegistry {
        DecoderRegistry::with_default_decoders(DEFAULT_SOL_PRICE_USD)
    }

    #[test]
    fn test_default_registry_has_two_decoders() {
        let reg = registry();
        assert_eq!(reg.stats().registered_decoders, 2);
    }

    #[test]
    fn test_unknown_shape_degrades_to_fallback() {
        let reg = registry();
        let account = PoolAccount::new(vec![0u8; 16], 2 * LAMPORTS_PER_SOL);
        let metadata = reg.decode(&account, "PoolX", None);

        assert_eq!(metadata.venue, PoolVenue::Unknown);
        assert_eq!(metadata.token_mint, "unknown");
        assert_eq!(metadata.quote_mint, "unknown");
        assert!((metadata.liquidity_usd - 2.0 * DEFAULT_SOL_PRICE_USD).abs() < 1e-9);
        assert_eq!(reg.stats().unknown, 1);
        assert_eq!(reg.stats().successful, 0);
    }

    #[test]
    fn test_unknown_pools_deduplicated() {
        let reg = registry();
        let account = PoolAccount::new(vec![0u8; 16], 0);
        reg.decode(&account, "PoolX", None);
        reg.decode(&account, "PoolX", None);
        reg.decode(&account, "PoolY", None);
        assert_eq!(reg.unknown_pool_count(), 2);
        assert_eq!(reg.stats().unknown, 3);
    }

    #[test]
    fn test_program_id_dispatch() {
        let reg = registry();
        let account = PoolAccount::new(pump_fun::tests::curve_bytes(120, 5, 10, 0, 0, false), 0);
        let metadata = reg.decode(&account, "CurvePool", Some(PUMP_FUN_PROGRAM));
        assert_eq!(metadata.venue, PoolVenue::PumpFun);
        assert_eq!(reg.stats().successful, 1);
    }

    #[test]
    fn test_try_in_order_without_program_id() {
        let reg = registry();
        let account = PoolAccount::new(pump_fun::tests::curve_bytes(150, 5, 10, 0, 0, false), 0);
        let metadata = reg.decode(&account, "CurvePool", None);
        assert_eq!(metadata.venue, PoolVenue::PumpFun);
    }

    #[test]
    fn test_wrong_program_hint_falls_through() {
        // Account shaped like a bonding curve but hinted as Raydium:
        // the Raydium decoder rejects on length, the iteration finds
        // pump.fun anyway
        let reg = registry();
        let account = PoolAccount::new(pump_fun::tests::curve_bytes(150, 5, 10, 0, 0, false), 0);
        let metadata = reg.decode(&account, "CurvePool", Some(RAYDIUM_AMM_V4));
        assert_eq!(metadata.venue, PoolVenue::PumpFun);
    }
}
