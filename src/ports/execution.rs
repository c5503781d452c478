//! Execution ports: transaction submission and blockhash refresh.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SendError {
    #[error("transaction rejected: {0}")]
    Rejected(String),

    #[error("confirmation timed out")]
    Timeout,

    #[error("connection: {0}")]
    Connection(String),

    #[error("blockhash expired")]
    BlockhashExpired,
}

/// Per-send parameters layered on top of the cached transaction
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SendOptions {
    /// Priority fee in micro-lamports per compute unit
    pub priority_fee_micro_lamports: u64,
    /// Skip preflight simulation; protective sends race the threat
    pub skip_preflight: bool,
    pub max_retries: u32,
}

/// Result of a confirmed send
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendOutcome {
    pub signature: String,
    pub confirmation_time_ms: u64,
}

/// A recent blockhash with its expiry height
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockhashInfo {
    pub blockhash: String,
    pub last_valid_block_height: u64,
}

/// Submission path for signed transaction bytes
#[async_trait]
pub trait TransactionSender: Send + Sync {
    async fn send_transaction(
        &self,
        transaction: &[u8],
        options: &SendOptions,
    ) -> Result<SendOutcome, SendError>;
}

/// Fresh blockhash per send attempt
#[async_trait]
pub trait BlockhashSource: Send + Sync {
    async fn get_valid_blockhash(&self) -> Result<BlockhashInfo, SendError>;
}
