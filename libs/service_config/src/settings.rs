//! Settings structures, loading and validation

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

const ENV_PREFIX: &str = "MMLOGIC";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Top-level service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MmlogicConfig {
    pub api: ApiConfig,
    pub storage: StorageConfig,
    pub results: ResultsConfig,
    pub thresholds: ThresholdConfig,
    pub evaluation: EvaluationConfig,
    pub ignore_lists: Vec<IgnoreListConfig>,
    pub proposals: ProposalConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub bind_address: String,
    pub port: u16,

    /// Upper bound on one request, streaming included
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Redis,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub redis_url: String,

    /// Connections shared by all concurrent requests
    pub pool_max_size: usize,
    pub acquire_timeout_ms: u64,

    /// Entries fetched per ZRANGEBYSCORE round-trip
    pub query_page_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultsConfig {
    /// Players per streamed roster page
    pub page_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Filters matching at least this many players log a warning
    pub warn_cardinality: u64,

    /// Filters matching more than this many players are rejected
    pub max_cardinality: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationMode {
    #[default]
    Sequential,
    Concurrent,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub mode: EvaluationMode,
}

/// One named exclusion list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IgnoreListConfig {
    pub name: String,

    /// Store key of the list's sorted set
    pub key: String,

    /// Entries older than this many seconds no longer exclude; 0 keeps all
    #[serde(default)]
    pub horizon_secs: u64,
}

impl IgnoreListConfig {
    pub fn new(name: impl Into<String>, key: impl Into<String>, horizon_secs: u64) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            horizon_secs,
        }
    }

    pub fn horizon(&self) -> Option<u64> {
        (self.horizon_secs > 0).then_some(self.horizon_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProposalConfig {
    /// Set receiving the ids of written proposals
    pub queue: String,

    /// Name of the ignore list proposed players are appended to
    pub ignore_list: String,
}

impl Default for MmlogicConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            storage: StorageConfig::default(),
            results: ResultsConfig::default(),
            thresholds: ThresholdConfig::default(),
            evaluation: EvaluationConfig::default(),
            ignore_lists: vec![
                IgnoreListConfig::new("proposed", "proposed", 800),
                IgnoreListConfig::new("deindexed", "deindexed", 800),
            ],
            proposals: ProposalConfig::default(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 50503,
            request_timeout_secs: 30,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Redis,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            pool_max_size: 16,
            acquire_timeout_ms: 5000,
            query_page_size: 10_000,
        }
    }
}

impl Default for ResultsConfig {
    fn default() -> Self {
        Self { page_size: 10_000 }
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            warn_cardinality: 100_000,
            max_cardinality: 500_000,
        }
    }
}

impl Default for ProposalConfig {
    fn default() -> Self {
        Self {
            queue: "proposalq".to_string(),
            ignore_list: "proposed".to_string(),
        }
    }
}

impl MmlogicConfig {
    /// Load from an optional TOML file plus `MMLOGIC__` environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            info!("Loading configuration file: {:?}", path);
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }
        builder = builder.add_source(Self::environment());

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from TOML text, without environment overrides
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = Config::builder()
            .add_source(File::from_str(contents, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.query_page_size == 0 {
            return Err(ConfigError::invalid("storage.query_page_size", "must be positive"));
        }
        if self.results.page_size == 0 {
            return Err(ConfigError::invalid("results.page_size", "must be positive"));
        }
        if self.storage.pool_max_size == 0 {
            return Err(ConfigError::invalid("storage.pool_max_size", "must be positive"));
        }
        if self.thresholds.warn_cardinality > self.thresholds.max_cardinality {
            return Err(ConfigError::invalid(
                "thresholds",
                format!(
                    "warn_cardinality {} exceeds max_cardinality {}",
                    self.thresholds.warn_cardinality, self.thresholds.max_cardinality
                ),
            ));
        }

        let mut names = HashSet::new();
        for list in &self.ignore_lists {
            if list.name.is_empty() || list.key.is_empty() {
                return Err(ConfigError::invalid("ignore_lists", "name and key are required"));
            }
            if !names.insert(list.name.as_str()) {
                return Err(ConfigError::invalid(
                    "ignore_lists",
                    format!("duplicate list name '{}'", list.name),
                ));
            }
        }
        if self.ignore_list(&self.proposals.ignore_list).is_none() {
            return Err(ConfigError::invalid(
                "proposals.ignore_list",
                format!("'{}' is not a configured ignore list", self.proposals.ignore_list),
            ));
        }
        Ok(())
    }

    pub fn ignore_list(&self, name: &str) -> Option<&IgnoreListConfig> {
        self.ignore_lists.iter().find(|l| l.name == name)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.request_timeout_secs)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.storage.acquire_timeout_ms)
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.api.bind_address, self.api.port)
    }
}
