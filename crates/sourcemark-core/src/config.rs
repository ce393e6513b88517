//! Configuration for sourcemark

use crate::error::ConfigError;
use crate::invalidate::InvalidationPolicy;
use crate::render::StaticCatalog;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

/// Logging target for configuration loading.
const LOG_TARGET: &str = "sourcemark::config";

/// Default configuration as TOML
pub const DEFAULT_CONFIG: &str = r#"# Sourcemark Configuration

[session]
# Quiescence window before edits are checked against references (milliseconds)
debounce_ms = 100
# How long a conversion waits for its scratch buffer (milliseconds)
conversion_timeout_ms = 5000
# Prefix of generated markup ids
markup_prefix = "m"
# "primary_only" compares the whole reference span; "strict" also compares its sub-spans
invalidation = "primary_only"

[backend]
# Query execution endpoint
endpoint = "http://localhost:5053/dqry/queries/execute"
# Request timeout (milliseconds)
timeout_ms = 30000

[catalog]
# Display names by id, e.g.
# tables = { "00000000-0000-0000-0000-000000000000" = "table_1" }
tables = {}
assets = {}
"#;

/// Sourcemark configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    /// Editing session behaviour.
    pub session: SessionConfig,
    #[serde(default)]
    /// Execution backend.
    pub backend: BackendConfig,
    #[serde(default)]
    /// Display names of backend entities.
    pub catalog: CatalogConfig,
}

/// Editing session behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_debounce_ms")]
    /// Quiescence window in milliseconds.
    pub debounce_ms: u64,
    #[serde(default = "default_conversion_timeout_ms")]
    /// Scratch readiness deadline in milliseconds.
    pub conversion_timeout_ms: u64,
    #[serde(default = "default_markup_prefix")]
    /// Prefix of generated markup ids.
    pub markup_prefix: String,
    #[serde(default)]
    /// Which ranges invalidation compares.
    pub invalidation: InvalidationPolicy,
}

/// Execution backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_endpoint")]
    /// URL receiving execution requests.
    pub endpoint: String,
    #[serde(default = "default_backend_timeout_ms")]
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
}

/// Display names keyed by id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    /// Table names.
    pub tables: BTreeMap<String, String>,
    #[serde(default)]
    /// Asset names.
    pub assets: BTreeMap<String, String>,
}

// Default value functions
fn default_debounce_ms() -> u64 {
    100
}
fn default_conversion_timeout_ms() -> u64 {
    5000
}
fn default_markup_prefix() -> String {
    "m".to_string()
}
fn default_endpoint() -> String {
    "http://localhost:5053/dqry/queries/execute".to_string()
}
fn default_backend_timeout_ms() -> u64 {
    30_000
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            conversion_timeout_ms: default_conversion_timeout_ms(),
            markup_prefix: default_markup_prefix(),
            invalidation: InvalidationPolicy::default(),
        }
    }
}

impl SessionConfig {
    /// Debounce window as a duration.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Conversion timeout as a duration.
    pub fn conversion_timeout(&self) -> Duration {
        Duration::from_millis(self.conversion_timeout_ms)
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_ms: default_backend_timeout_ms(),
        }
    }
}

impl BackendConfig {
    /// Request timeout as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl CatalogConfig {
    /// Build a catalog from the configured names. Entries with invalid ids are ignored.
    pub fn to_catalog(&self) -> StaticCatalog {
        let mut catalog = StaticCatalog::new();
        for (id, name) in &self.tables {
            if let Some(id) = parse_id(id) {
                catalog.insert_table(id, name.clone());
            }
        }
        for (id, name) in &self.assets {
            if let Some(id) = parse_id(id) {
                catalog.insert_asset(id, name.clone());
            }
        }
        catalog
    }
}

fn parse_id(id: &str) -> Option<Uuid> {
    match Uuid::parse_str(id.trim()) {
        Ok(id) => Some(id),
        Err(err) => {
            log::warn!(target: LOG_TARGET, "ignoring catalog entry '{}': {}", id, err);
            None
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse config from TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}
