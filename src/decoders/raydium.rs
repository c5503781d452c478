//! Raydium AMM v4 Pool Decoder
//!
//! Fixed-layout liquidity state record, 752 bytes. The layout yields
//! structural facts only: decimals, base/quote mints, and the two vault
//! addresses. Actual USD liquidity lives in the vault token accounts
//! and must be derived externally, so `liquidity_usd` is always zero
//! here.

use solana_sdk::pubkey::Pubkey;

use super::{PoolAccount, PoolMetadata, PoolVenue};
use crate::domain::known_programs::RAYDIUM_AMM_V4;

/// Minimum account size for the v4 liquidity state layout
pub const RAYDIUM_AMM_ACCOUNT_LEN: usize = 752;

// Fixed byte offsets into the v4 layout
const BASE_DECIMAL_OFFSET: usize = 32;
const QUOTE_DECIMAL_OFFSET: usize = 40;
const BASE_VAULT_OFFSET: usize = 336;
const QUOTE_VAULT_OFFSET: usize = 368;
const BASE_MINT_OFFSET: usize = 400;
const QUOTE_MINT_OFFSET: usize = 432;

/// Largest plausible value for the leading status field; anything
/// bigger means the bytes are not a v4 pool record
const MAX_STATUS: u64 = 255;

#[derive(Debug, Clone, Copy, Default)]
pub struct RaydiumAmmDecoder;

impl RaydiumAmmDecoder {
    pub fn new() -> Self {
        Self
    }

    pub fn program_id(&self) -> &'static str {
        RAYDIUM_AMM_V4
    }

    /// Shape check: the v4 record is at least 752 bytes
    pub fn can_decode(&self, account: &PoolAccount) -> bool {
        account.data.len() >= RAYDIUM_AMM_ACCOUNT_LEN
    }

    /// Structural parse; rejects records whose status field is
    /// implausible even when the length matches
    pub fn decode(&self, account: &PoolAccount, pool_address: &str) -> Option<PoolMetadata> {
        let data = &account.data;
        if data.len() < RAYDIUM_AMM_ACCOUNT_LEN {
            return None;
        }

        let status = read_u64(data, 0)?;
        if status > MAX_STATUS {
            return None;
        }

        let base_decimals = read_u64(data, BASE_DECIMAL_OFFSET)?;
        let quote_decimals = read_u64(data, QUOTE_DECIMAL_OFFSET)?;
        let base_vault = read_pubkey(data, BASE_VAULT_OFFSET)?;
        let quote_vault = read_pubkey(data, QUOTE_VAULT_OFFSET)?;
        let base_mint = read_pubkey(data, BASE_MINT_OFFSET)?;
        let quote_mint = read_pubkey(data, QUOTE_MINT_OFFSET)?;

        Some(PoolMetadata {
            pool_address: pool_address.to_string(),
            token_mint: base_mint.to_string(),
            quote_mint: quote_mint.to_string(),
            // Vault balances are an external concern
            liquidity_usd: 0.0,
            program_id: RAYDIUM_AMM_V4.to_string(),
            venue: PoolVenue::RaydiumAmm,
            additional_data: serde_json::json!({
                "status": status,
                "base_decimals": base_decimals,
                "quote_decimals": quote_decimals,
                "base_vault": base_vault.to_string(),
                "quote_vault": quote_vault.to_string(),
            }),
        })
    }
}

fn read_u64(data: &[u8], offset: usize) -> Option<u64> {
    let bytes = data.get(offset..offset + 8)?;
    Some(u64::from_le_bytes(bytes.try_into().ok()?))
}

fn read_pubkey(data: &[u8], offset: usize) -> Option<Pubkey> {
    let bytes: [u8; 32] = data.get(offset..offset + 32)?.try_into().ok()?;
    Some(Pubkey::new_from_array(bytes))
}
