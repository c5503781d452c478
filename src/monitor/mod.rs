//! Mempool Monitor - realtime threat detection service

pub mod service;
pub mod stats;

pub use service::{
    determine_priority, EventPriority, MempoolMonitor, MonitorError, MonitorState,
};
pub use stats::{DetectionStats, LatencySummary};
