//! Known Program Addresses
//!
//! Constants for the Solana programs the sentinel watches and the DEX /
//! token programs the transaction analyzer recognizes.

use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

/// Raydium AMM v4 program
pub const RAYDIUM_AMM_V4: &str = "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8";

/// Pump.fun bonding curve program
pub const PUMP_FUN_PROGRAM: &str = "6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P";

/// SPL Token program
pub const TOKEN_PROGRAM: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";

/// SPL Token-2022 program
pub const TOKEN_2022_PROGRAM: &str = "TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb";

/// Wrapped SOL mint, the quote side of every bonding curve
pub const WSOL_MINT: &str = "So11111111111111111111111111111111111111112";

/// DEX programs whose remove-liquidity and swap instructions carry
/// threat signal
pub const KNOWN_DEX_PROGRAMS: &[&str] = &[
    // Raydium AMM v4
    RAYDIUM_AMM_V4,
    // Raydium CLMM
    "CAMMCzo5YL8w4VFF8KVHrK22GGUsp5VTaW7grrKgrWqK",
    // Raydium CP (Constant Product)
    "CPMMoo8L3F4NbTegBCKVNunggL7H1ZpdTHKxQB5qKP1C",
    // Orca Whirlpool
    "whirLbMiicVdio4qvUfM5KAg6Ct8VwpYzGff3uctyCc",
    // Meteora DLMM
    "LBUZKhRxPF3XUpBCjp4YzTKgLccjZhTSDM9YuVaPwxo",
    // Pump.fun
    PUMP_FUN_PROGRAM,
];

/// Token programs whose freeze/set-authority instructions carry threat
/// signal
pub const TOKEN_PROGRAMS: &[&str] = &[TOKEN_PROGRAM, TOKEN_2022_PROGRAM];

/// Fixed set of programs the monitor subscribes to, one log subscription
/// per program
pub const MONITORED_PROGRAMS: &[&str] = &[
    RAYDIUM_AMM_V4,
    "CAMMCzo5YL8w4VFF8KVHrK22GGUsp5VTaW7grrKgrWqK",
    PUMP_FUN_PROGRAM,
    TOKEN_PROGRAM,
];

/// Check if a program ID string is a recognized DEX program
pub fn is_known_dex_program(program_id: &str) -> bool {
    KNOWN_DEX_PROGRAMS.contains(&program_id)
}

/// Check if a program ID string is a token program
pub fn is_token_program(program_id: &str) -> bool {
    TOKEN_PROGRAMS.contains(&program_id)
}

/// Parse the monitored program set into Pubkeys
pub fn monitored_program_pubkeys() -> Vec<Pubkey> {
    MONITORED_PROGRAMS
        .iter()
        .filter_map(|s| Pubkey::from_str(s).ok())
        .collect()
}
