//! Aegis Sentinel - Mempool Threat Detection and Protective Execution
//!
//! Watches Solana program logs for transactions that threaten protected
//! token positions (liquidity pulls, authority changes, freezes, large
//! sells) and races them with pre-signed emergency-sell transactions.
//!
//! # Modules
//!
//! - `domain`: Core detection logic (analyzer, watch filters, registry,
//!   circuit breaker)
//! - `decoders`: Pool account decoders (Raydium AMM v4, Pump.fun)
//! - `events`: Broadcast bus between detection and execution
//! - `monitor`: Realtime mempool monitor service
//! - `executor`: Frontrunner execution service
//! - `ports`: Trait abstractions for streams, stores, and senders
//! - `adapters`: Websocket stream, file stores, paper execution
//! - `config`: Configuration loading and validation

pub mod adapters;
pub mod config;
pub mod decoders;
pub mod domain;
pub mod events;
pub mod executor;
pub mod monitor;
pub mod ports;
