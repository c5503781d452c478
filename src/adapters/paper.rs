//! Paper Execution Adapters
//!
//! Dry-run submission path: accepts every transaction, fabricates a
//! plausible signature and confirmation time, and never touches the
//! network. Lets the whole pipeline run end to end before real keys
//! and RPC endpoints are wired in.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use rand::Rng;
use tracing::info;

use crate::ports::{
    BlockhashInfo, BlockhashSource, SendError, SendOptions, SendOutcome, TransactionSender,
};

/// Simulated confirmation latency bounds, milliseconds
const MIN_CONFIRMATION_MS: u64 = 20;
const MAX_CONFIRMATION_MS: u64 = 120;

/// Sender that confirms everything locally
#[derive(Debug, Default)]
pub struct PaperTransactionSender {
    sent: AtomicU64,
}

impl PaperTransactionSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransactionSender for PaperTransactionSender {
    async fn send_transaction(
        &self,
        transaction: &[u8],
        options: &SendOptions,
    ) -> Result<SendOutcome, SendError> {
        if transaction.is_empty() {
            return Err(SendError::Rejected("empty transaction".to_string()));
        }
        self.sent.fetch_add(1, Ordering::SeqCst);

        let (signature, confirmation_time_ms) = {
            let mut rng = rand::thread_rng();
            let mut sig_bytes = [0u8; 64];
            rng.fill(&mut sig_bytes);
            (
                bs58::encode(sig_bytes).into_string(),
                rng.gen_range(MIN_CONFIRMATION_MS..=MAX_CONFIRMATION_MS),
            )
        };
        info!(
            signature = %signature,
            bytes = transaction.len(),
            priority_fee = options.priority_fee_micro_lamports,
            "Paper-confirmed transaction"
        );
        Ok(SendOutcome {
            signature,
            confirmation_time_ms,
        })
    }
}

/// Blockhash source that fabricates a fresh hash per call
#[derive(Debug, Default)]
pub struct PaperBlockhashSource {
    height: AtomicU64,
}

impl PaperBlockhashSource {
    pub fn new() -> Self {
        Self {
            height: AtomicU64::new(250_000_000),
        }
    }
}

#[async_trait]
impl BlockhashSource for PaperBlockhashSource {
    async fn get_valid_blockhash(&self) -> Result<BlockhashInfo, SendError> {
        let height = self.height.fetch_add(1, Ordering::SeqCst);
        let hash_bytes = {
            let mut bytes = [0u8; 32];
            rand::thread_rng().fill(&mut bytes);
            bytes
        };
        Ok(BlockhashInfo {
            blockhash: bs58::encode(hash_bytes).into_string(),
            last_valid_block_height: height + 150,
        })
    }
}
