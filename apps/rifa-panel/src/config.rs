use std::fmt;
use std::fs;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgres,
}

impl std::str::FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            other => Err(anyhow::anyhow!("Unknown storage backend '{}'", other)),
        }
    }
}

/// Where the running configuration came from. Reported once logging is up.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigSource {
    #[default]
    Defaults,
    File(String),
    Environment,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::Defaults => f.write_str("built-in defaults"),
            ConfigSource::File(path) => f.write_str(path),
            ConfigSource::Environment => f.write_str("environment"),
        }
    }
}

fn default_max_connections() -> u32 {
    10
}

fn default_max_commit_attempts() -> usize {
    16
}

fn default_log_filter() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelConfig {
    #[serde(default)]
    pub storage: StorageBackend,
    pub database_url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub db_max_connections: u32,
    /// How often a conditional write whose guard no longer holds is re-read and retried.
    #[serde(default = "default_max_commit_attempts")]
    pub max_commit_attempts: usize,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    #[serde(skip)]
    pub source: ConfigSource,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            storage: StorageBackend::default(),
            database_url: None,
            db_max_connections: default_max_connections(),
            max_commit_attempts: default_max_commit_attempts(),
            log_filter: default_log_filter(),
            source: ConfigSource::Defaults,
        }
    }
}

impl PanelConfig {
    /// Runs before the subscriber exists, so it does not log; `source` records what was used.
    pub fn load() -> Result<Self> {
        Self::load_from(&["/etc/rifa/panel.toml", "./panel.toml"])
    }

    pub fn load_from(config_paths: &[&str]) -> Result<Self> {
        for path in config_paths {
            if let Ok(contents) = fs::read_to_string(path) {
                let mut config =
                    Self::from_toml(&contents).with_context(|| format!("Invalid config in {}", path))?;
                config.source = ConfigSource::File(path.to_string());
                return Ok(config);
            }
        }
        Self::from_env()
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            storage: match std::env::var("RIFA_STORAGE") {
                Ok(value) => value.parse()?,
                Err(_) => defaults.storage,
            },
            database_url: std::env::var("DATABASE_URL").ok(),
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.db_max_connections),
            max_commit_attempts: std::env::var("MAX_COMMIT_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_commit_attempts),
            log_filter: std::env::var("RUST_LOG")
                .or_else(|_| std::env::var("LOG_FILTER"))
                .unwrap_or(defaults.log_filter),
            source: ConfigSource::Environment,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.storage == StorageBackend::Postgres && self.database_url.is_none() {
            return Err(anyhow::anyhow!("DATABASE_URL is required for the postgres backend"));
        }
        if self.max_commit_attempts == 0 {
            return Err(anyhow::anyhow!("max_commit_attempts must be at least 1"));
        }
        Ok(())
    }
}
