//! Ports Layer - trait boundaries between the domain and the outside
//!
//! Every external interaction (RPC, websocket log stream, persisted
//! target store, transaction submission) goes through one of these
//! traits so the detection and execution services can run against
//! in-memory fakes in tests and paper adapters in dry runs.

pub mod execution;
pub mod models;
pub mod store;
pub mod stream;

pub mod mocks;

pub use execution::{
    BlockhashInfo, BlockhashSource, SendError, SendOptions, SendOutcome, TransactionSender,
};
pub use models::{ParsedInstruction, ParsedTransaction};
pub use store::{
    CachedTransaction, CachedTxMetadata, StoreError, TargetChange, TargetStore, TargetUpdate,
    TransactionCache,
};
pub use stream::{FetchError, LogEvent, LogStream, StreamError, TransactionFetcher};
