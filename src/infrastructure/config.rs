//! Configuration infrastructure
//!
//! Configuration is organized into three sections:
//! 1. Database location
//! 2. Logging output and levels
//! 3. Reconciliation settings (article format)
//!
//! Two ways to load it: `ConfigManager` keeps a JSON file in the user config
//! directory, and `AppConfig::from_layers` stacks an optional file with
//! `CATALOG_RECONCILE_*` environment variables through the `config` crate.

#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{info, warn};

use crate::domain::article::ArticleFormat;
use crate::domain::errors::ReconciliationResult;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config: {source}")]
    Load {
        #[from]
        source: config::ConfigError,
    },

    #[error("Configuration validation failed: {message}")]
    Validation { message: String },
}

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub reconciliation: ReconciliationConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx connection url, e.g. `sqlite:data/catalog.db`
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted logs
    pub json_format: bool,

    /// Enable console output
    pub console_output: bool,

    /// Enable file output
    pub file_output: bool,

    /// Log directory; empty means `logs/` next to the executable
    pub directory: String,

    /// Log file name inside the directory
    pub file_name: String,

    /// Number of log files to keep (older files will be deleted)
    pub max_files: u32,

    /// Enable automatic log cleanup on startup
    pub auto_cleanup_logs: bool,

    /// Module-specific log level filters (e.g., "sqlx": "warn")
    pub module_filters: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    /// Text between article prefix and sequence, e.g. "-" in `BEKP-0001`
    pub article_separator: String,

    /// Zero-padded width of the article sequence
    pub article_sequence_width: usize,
}

impl ReconciliationConfig {
    pub fn article_format(&self) -> ReconciliationResult<ArticleFormat> {
        ArticleFormat::new(&self.article_separator, self.article_sequence_width)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: defaults::DATABASE_URL.to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: defaults::LOG_JSON_FORMAT,
            console_output: defaults::LOG_CONSOLE_OUTPUT,
            file_output: defaults::LOG_FILE_OUTPUT,
            directory: String::new(),
            file_name: defaults::LOG_FILE_NAME.to_string(),
            max_files: defaults::LOG_MAX_FILES,
            auto_cleanup_logs: defaults::LOG_AUTO_CLEANUP,
            module_filters: {
                let mut filters = HashMap::new();
                filters.insert("sqlx".to_string(), "warn".to_string());
                filters.insert("catalog_reconcile_lib".to_string(), "info".to_string());
                filters
            },
        }
    }
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            article_separator: defaults::ARTICLE_SEPARATOR.to_string(),
            article_sequence_width: defaults::ARTICLE_SEQUENCE_WIDTH,
        }
    }
}

impl AppConfig {
    /// Optional config file (any format the `config` crate knows) overlaid
    /// with `CATALOG_RECONCILE_<SECTION>__<KEY>` environment variables
    pub fn from_layers(path: Option<&Path>) -> Result<Self, ConfigError> {
        let defaults = config::Config::try_from(&Self::default())?;
        let mut builder = config::Config::builder().add_source(defaults);
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(defaults::ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Validation {
                message: "database.url must not be empty".to_string(),
            });
        }

        if !self.logging.console_output && !self.logging.file_output {
            return Err(ConfigError::Validation {
                message: "at least one of logging.console_output and logging.file_output must be enabled".to_string(),
            });
        }

        self.reconciliation
            .article_format()
            .map_err(|e| ConfigError::Validation { message: e.to_string() })?;

        Ok(())
    }
}

/// Configuration file manager for the JSON config in the user directory
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Get the application configuration directory
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join(defaults::APP_DIR_NAME);

        Ok(config_dir)
    }

    /// Create a new configuration manager with the default location
    pub fn new() -> Result<Self> {
        let config_dir = Self::get_config_dir()?;
        Ok(Self::with_path(config_dir.join(defaults::CONFIG_FILE_NAME)))
    }

    pub fn with_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    /// Load configuration from file, creating default if it doesn't exist
    pub async fn load_config(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            info!("Configuration file not found, creating default: {:?}", self.config_path);
            let default_config = AppConfig::default();
            self.save_config(&default_config).await?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(&self.config_path)
            .await
            .context("Failed to read configuration file")?;

        let parsed = serde_json::from_str::<AppConfig>(&content)
            .map_err(anyhow::Error::from)
            .and_then(|config| config.validate().map(|()| config).map_err(anyhow::Error::from));

        match parsed {
            Ok(config) => {
                info!("Loaded configuration from: {:?}", self.config_path);
                Ok(config)
            }
            Err(parse_error) => {
                warn!("⚠️  Configuration file unusable: {}", parse_error);

                // Create backup of corrupted config
                let backup_path = self.config_path.with_extension("json.corrupted");
                if let Err(e) = fs::copy(&self.config_path, &backup_path).await {
                    warn!("Failed to create backup of corrupted config: {}", e);
                } else {
                    info!("Backed up corrupted config to: {:?}", backup_path);
                }

                self.reset_to_defaults().await
            }
        }
    }

    /// Save configuration to file
    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        let content = serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;

        fs::write(&self.config_path, content)
            .await
            .context("Failed to write configuration file")?;

        info!("Saved configuration to: {:?}", self.config_path);
        Ok(())
    }

    /// Reset configuration to defaults (useful for troubleshooting)
    pub async fn reset_to_defaults(&self) -> Result<AppConfig> {
        info!("🔄 Resetting configuration to defaults");

        let default_config = AppConfig::default();
        self.save_config(&default_config).await?;

        info!("✅ Configuration reset to defaults");
        Ok(default_config)
    }

    /// Get the configuration file path
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}

/// Default values for every configurable setting
pub mod defaults {
    /// Directory name under the user config dir
    pub const APP_DIR_NAME: &str = "catalog-reconcile";

    pub const CONFIG_FILE_NAME: &str = "catalog_reconcile_config.json";

    /// Environment variable prefix for layered configuration
    pub const ENV_PREFIX: &str = "CATALOG_RECONCILE";

    pub const DATABASE_URL: &str = "sqlite:data/catalog.db";

    pub const LOG_LEVEL: &str = "info";
    pub const LOG_JSON_FORMAT: bool = false;
    pub const LOG_CONSOLE_OUTPUT: bool = true;
    pub const LOG_FILE_OUTPUT: bool = false;
    pub const LOG_FILE_NAME: &str = "catalog-reconcile.log";
    pub const LOG_MAX_FILES: u32 = 5;
    pub const LOG_AUTO_CLEANUP: bool = true;

    pub const ARTICLE_SEPARATOR: &str = "-";
    pub const ARTICLE_SEQUENCE_WIDTH: usize = 4;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.reconciliation.article_format().map(|f| f.synthesize("BE", 3)).ok(), Some("BE-0003".to_string()));
    }

    #[test]
    fn layered_file_overrides_defaults() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("reconcile.json");
        std::fs::write(
            &path,
            r#"{"reconciliation": {"article_separator": "", "article_sequence_width": 5}}"#,
        )?;

        let config = AppConfig::from_layers(Some(&path))?;
        assert_eq!(config.reconciliation.article_separator, "");
        assert_eq!(config.reconciliation.article_sequence_width, 5);
        assert_eq!(config.database.url, defaults::DATABASE_URL);
        Ok(())
    }

    #[test]
    fn invalid_article_width_fails_validation() {
        let mut config = AppConfig::default();
        config.reconciliation.article_sequence_width = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation { .. })));
    }

    #[tokio::test]
    async fn manager_creates_default_then_round_trips() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let manager = ConfigManager::with_path(dir.path().join("nested").join("config.json"));

        let created = manager.load_config().await?;
        assert_eq!(created, AppConfig::default());
        assert!(manager.config_path().exists());

        let mut changed = created.clone();
        changed.database.url = "sqlite:other.db".to_string();
        manager.save_config(&changed).await?;
        assert_eq!(manager.load_config().await?, changed);
        Ok(())
    }

    #[tokio::test]
    async fn corrupted_file_is_backed_up_and_reset() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ definitely not json")?;

        let manager = ConfigManager::with_path(&path);
        assert_eq!(manager.load_config().await?, AppConfig::default());
        assert!(path.with_extension("json.corrupted").exists());
        Ok(())
    }
}
