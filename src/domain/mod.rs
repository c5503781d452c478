//! Domain Layer - Core detection and protection logic
//!
//! Pure logic with no IO: threat classification, the protected-target
//! registry, probabilistic watch filters, and the execution circuit
//! breaker. All external interactions happen through the ports layer.

pub mod analyzer;
pub mod bloom;
pub mod circuit_breaker;
pub mod known_programs;
pub mod registry;
pub mod threat;

pub use analyzer::{balance_changes, AnalyzerConfig, BalanceChanges, TransactionAnalyzer};
pub use bloom::{WatchFilters, WatchNamespace};
pub use circuit_breaker::{BreakerStatus, ExecutionOutcome, FailureWindowBreaker};
pub use registry::{ProtectedTarget, TargetRegistry};
pub use threat::{
    now_ms, RiskLevel, ThreatAlert, ThreatAnalysis, ThreatDetectedEvent, ThreatType,
};
