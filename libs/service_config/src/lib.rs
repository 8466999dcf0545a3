//! # Matchmaking Logic API Configuration
//!
//! Settings are read once at startup and shared read-only afterwards.
//!
//! Sources, lowest precedence first:
//! 1. Built-in defaults ([`MmlogicConfig::default`])
//! 2. An optional TOML file
//! 3. Environment variables prefixed `MMLOGIC__`, nested with `__`
//!    (e.g. `MMLOGIC__RESULTS__PAGE_SIZE=500`)

pub mod settings;

pub use settings::{
    ApiConfig, ConfigError, EvaluationConfig, EvaluationMode, IgnoreListConfig, MmlogicConfig,
    ProposalConfig, ResultsConfig, StorageBackend, StorageConfig, ThresholdConfig,
};
