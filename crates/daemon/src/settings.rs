//! Daemon Settings
//!
//! Layered configuration: built-in defaults, then an optional TOML file
//! (`segmill.toml`, or `SEGMILL_CONFIG`), then `SEGMILL_*` environment
//! variables with `__` as the section separator, e.g.
//! `SEGMILL_RPC__PORT=9631` or `SEGMILL_LOG__FORMAT=json`.

use std::collections::BTreeMap;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

const DEFAULT_DB_PATH: &str = "~/.segmill/segmill.db";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub rpc: RpcSettings,
    pub esp: EspSettings,
    pub catalog: CatalogSettings,
    pub runner: RunnerSettings,
    pub maintenance: MaintenanceSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub path: String,
}

impl DatabaseSettings {
    pub fn expanded_path(&self) -> String {
        shellexpand::tilde(&self.path).into_owned()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EspSettings {
    pub base_url: String,
    /// API key per credential reference. Usually set in the TOML file, as
    /// environment variable names cannot carry arbitrary reference strings.
    #[serde(default)]
    pub api_keys: BTreeMap<String, String>,
    pub timeout_secs: u64,
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogSettings {
    /// Optional JSON file of extra segment templates, merged over the
    /// built-in catalog (id collisions take the file's version).
    pub path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunnerSettings {
    pub poll_interval_ms: u64,
    pub claim_batch_size: i64,
    pub min_call_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MaintenanceSettings {
    pub retention_days: u64,
    pub interval_hours: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    /// "pretty" or "json".
    pub format: String,
    /// When set, logs go to a daily-rolling file in this directory instead
    /// of stdout.
    pub dir: Option<String>,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("SEGMILL_CONFIG").unwrap_or_else(|_| "segmill.toml".to_string());

        Config::builder()
            .set_default("database.path", DEFAULT_DB_PATH)?
            .set_default("rpc.host", "127.0.0.1")?
            .set_default("rpc.port", 9630_i64)?
            .set_default("esp.base_url", "https://api.esp.example.com")?
            .set_default("esp.timeout_secs", 30_i64)?
            .set_default("esp.max_attempts", 3_i64)?
            .set_default("catalog.path", None::<String>)?
            .set_default("runner.poll_interval_ms", 1_000_i64)?
            .set_default("runner.claim_batch_size", 8_i64)?
            .set_default("runner.min_call_interval_ms", 1_500_i64)?
            .set_default("maintenance.retention_days", 30_i64)?
            .set_default("maintenance.interval_hours", 24_i64)?
            .set_default("log.format", "pretty")?
            .set_default("log.dir", None::<String>)?
            .add_source(File::with_name(&config_path).required(false))
            .add_source(Environment::with_prefix("SEGMILL").separator("__"))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_deserialize() {
        let settings = Settings::load().unwrap();
        assert_eq!(settings.rpc.port, 9630);
        assert_eq!(settings.runner.claim_batch_size, 8);
        assert_eq!(settings.log.format, "pretty");
        assert!(settings.esp.api_keys.is_empty());
        assert!(settings.catalog.path.is_none());
    }

    #[test]
    fn test_tilde_expansion() {
        let db = DatabaseSettings {
            path: "~/.segmill/segmill.db".to_string(),
        };
        assert!(!db.expanded_path().starts_with('~'));
    }
}
