//! Pump.fun Bonding Curve Decoder
//!
//! Variable-length curve account, 100-300 bytes. After the 8-byte
//! discriminator: a 32-byte mint, four little-endian u64 reserves
//! (real SOL, real token, virtual SOL, virtual token), and a 1-byte
//! completion flag. Price is a pure function of the reserves; no
//! external liquidity provider exists until the curve migrates to a
//! standard AMM at 85 SOL.

use solana_sdk::pubkey::Pubkey;

use super::{PoolAccount, PoolMetadata, PoolVenue, DEFAULT_SOL_PRICE_USD, LAMPORTS_PER_SOL};
use crate::domain::known_programs::{PUMP_FUN_PROGRAM, WSOL_MINT};

/// Shape-check bounds for a curve account
pub const MIN_CURVE_ACCOUNT_LEN: usize = 100;
pub const MAX_CURVE_ACCOUNT_LEN: usize = 300;

/// Bytes actually consumed by the structural parse
const PARSED_LEN: usize = 73;

/// Account discriminator the curve layout begins with
const CURVE_DISCRIMINATOR: [u8; 8] = [0x17, 0xb7, 0xf8, 0x37, 0x60, 0xd8, 0xac, 0x60];

const MINT_OFFSET: usize = 8;
const REAL_SOL_OFFSET: usize = 40;
const REAL_TOKEN_OFFSET: usize = 48;
const VIRTUAL_SOL_OFFSET: usize = 56;
const VIRTUAL_TOKEN_OFFSET: usize = 64;
const COMPLETE_OFFSET: usize = 72;

/// Real SOL reserve above which the curve is about to migrate;
/// migration happens at a fixed 85 SOL in this domain
pub const NEAR_COMPLETION_SOL: f64 = 80.0;

#[derive(Debug, Clone, Copy)]
pub struct PumpFunDecoder {
    sol_price_usd: f64,
}

impl Default for PumpFunDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_SOL_PRICE_USD)
    }
}

impl PumpFunDecoder {
    pub fn new(sol_price_usd: f64) -> Self {
        Self { sol_price_usd }
    }

    pub fn program_id(&self) -> &'static str {
        PUMP_FUN_PROGRAM
    }

    /// Shape check: curve accounts sit in a narrow length band
    pub fn can_decode(&self, account: &PoolAccount) -> bool {
        (MIN_CURVE_ACCOUNT_LEN..=MAX_CURVE_ACCOUNT_LEN).contains(&account.data.len())
    }

    pub fn decode(&self, account: &PoolAccount, pool_address: &str) -> Option<PoolMetadata> {
        let data = &account.data;
        if data.len() < PARSED_LEN {
            return None;
        }
        if data[..8] != CURVE_DISCRIMINATOR {
            return None;
        }

        let mint_bytes: [u8; 32] = data.get(MINT_OFFSET..MINT_OFFSET + 32)?.try_into().ok()?;
        let mint = Pubkey::new_from_array(mint_bytes);
        let real_sol = read_u64(data, REAL_SOL_OFFSET)?;
        let real_token = read_u64(data, REAL_TOKEN_OFFSET)?;
        let virtual_sol = read_u64(data, VIRTUAL_SOL_OFFSET)?;
        let virtual_token = read_u64(data, VIRTUAL_TOKEN_OFFSET)?;
        let complete = *data.get(COMPLETE_OFFSET)? != 0;

        let real_sol_units = real_sol as f64 / LAMPORTS_PER_SOL as f64;
        let liquidity_usd = real_sol_units * self.sol_price_usd;
        let price_usd = self.price_usd(real_sol, virtual_sol, real_token, virtual_token);
        let near_completion = real_sol_units > NEAR_COMPLETION_SOL;

        Some(PoolMetadata {
            pool_address: pool_address.to_string(),
            token_mint: mint.to_string(),
            quote_mint: WSOL_MINT.to_string(),
            liquidity_usd,
            program_id: PUMP_FUN_PROGRAM.to_string(),
            venue: PoolVenue::PumpFun,
            additional_data: serde_json::json!({
                "real_sol_reserves": real_sol,
                "real_token_reserves": real_token,
                "virtual_sol_reserves": virtual_sol,
                "virtual_token_reserves": virtual_token,
                "complete": complete,
                "price_usd": price_usd,
                "near_completion": near_completion,
            }),
        })
    }

    /// price = (realSol + virtualSol) / (realToken + virtualToken),
    /// converted to USD; zero total token reserve yields price 0
    fn price_usd(&self, real_sol: u64, virtual_sol: u64, real_token: u64, virtual_token: u64) -> f64 {
        let total_token = real_token as u128 + virtual_token as u128;
        if total_token == 0 {
            return 0.0;
        }
        let total_sol = (real_sol as u128 + virtual_sol as u128) as f64;
        total_sol / total_token as f64 * self.sol_price_usd
    }
}

fn read_u64(data: &[u8], offset: usize) -> Option<u64> {
    let bytes = data.get(offset..offset + 8)?;
    Some(u64::from_le_bytes(bytes.try_into().ok()?))
}
