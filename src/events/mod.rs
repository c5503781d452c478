//! Event Bus - broadcast channel between detection and execution

pub mod bus;

pub use bus::{EventBus, SentinelEvent, DEFAULT_BUS_CAPACITY};
