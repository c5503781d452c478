//! Configuration - TOML file loading and validation

pub mod loader;

pub use loader::{
    load_config, Config, ConfigError, EndpointsSection, ExecutionSection, FiltersSection,
    LoggingSection, MonitorSection, PricingSection, StoreSection,
};
