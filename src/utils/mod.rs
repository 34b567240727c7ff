//! Configuration

pub mod config;

pub use config::{
    ConfigError, EngineConfig, FilterConfig, LocalizationConfig, PropagationPolicy, SolverConfig, StationConfig,
    ValidationReport,
};
