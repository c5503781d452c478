//! Adapters Layer - concrete implementations of the ports
//!
//! - `ws_stream`: Solana websocket `logsSubscribe` client
//! - `rpc_fetcher`: `getTransaction` over JSON-RPC
//! - `file_store`: JSON-file target store, alert log, and pre-signed
//!   transaction cache
//! - `paper`: dry-run submission path that fabricates confirmations

pub mod file_store;
pub mod paper;
pub mod rpc_fetcher;
pub mod ws_stream;

pub use file_store::{FileTargetStore, FileTransactionCache};
pub use paper::{PaperBlockhashSource, PaperTransactionSender};
pub use rpc_fetcher::RpcTransactionFetcher;
pub use ws_stream::WsLogStream;
