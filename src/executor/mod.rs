//! Frontrunner Service - protective transaction execution

pub mod service;

pub use service::{
    compute_priority_fee, ExecutionError, ExecutorStats, FrontrunnerService,
};
