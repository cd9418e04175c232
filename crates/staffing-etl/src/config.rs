//! Configuration management
//!
//! Layered with figment, lowest priority first: built-in defaults, an
//! optional TOML file, `STAFFING_*` environment variables (`__` separates
//! nested keys, e.g. `STAFFING_DATABASE__MAX_CONNECTIONS`) and finally
//! `DATABASE_URL`. A `.env` file is read before the environment is consulted.

use chrono::{NaiveDate, Utc};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use staffing_common::{Result, StaffingError};

use crate::pipeline::CleanseOptions;
use crate::quarantine::DEFAULT_SPOILAGE_THRESHOLD;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Config file read from the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "staffing.toml";

/// Default directory searched for input files.
pub const DEFAULT_DATA_DIR: &str = "data";

/// Default directory for quarantine logs.
pub const DEFAULT_QUARANTINE_DIR: &str = "data/quarantine";

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://staffing_user@localhost:5433/staffing_db";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// ETL configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtlConfig {
    pub data_dir: PathBuf,
    pub quarantine_dir: PathBuf,
    /// Last date accepted by the future-date rules; today (UTC) when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_of: Option<NaiveDate>,
    pub spoilage_threshold: f64,
    pub database: DatabaseConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            quarantine_dir: PathBuf::from(DEFAULT_QUARANTINE_DIR),
            as_of: None,
            spoilage_threshold: DEFAULT_SPOILAGE_THRESHOLD,
            database: DatabaseConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
            connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
        }
    }
}

impl EtlConfig {
    /// Load configuration from `path`, or from `staffing.toml` when it exists
    ///
    /// An explicitly named file must exist.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut figment = Figment::from(Serialized::defaults(EtlConfig::default()));

        match path {
            Some(path) if !path.exists() => {
                return Err(StaffingError::config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            },
            Some(path) => figment = figment.merge(Toml::file(path)),
            None => {
                let default_file = Path::new(DEFAULT_CONFIG_FILE);
                if default_file.exists() {
                    figment = figment.merge(Toml::file(default_file));
                }
            },
        }

        figment = figment.merge(Env::prefixed("STAFFING_").split("__"));

        let mut config: EtlConfig = figment
            .extract()
            .map_err(|e| StaffingError::config(e.to_string()))?;

        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database.url = url;
        }

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.spoilage_threshold) {
            return Err(StaffingError::config(format!(
                "spoilage_threshold must be between 0 and 1, got {}",
                self.spoilage_threshold
            )));
        }

        if self.database.url.is_empty() {
            return Err(StaffingError::config("Database URL cannot be empty"));
        }

        if self.database.max_connections == 0 {
            return Err(StaffingError::config(
                "Database max_connections must be greater than 0",
            ));
        }

        Ok(())
    }

    /// The configured as-of date, or today in UTC
    pub fn as_of(&self) -> NaiveDate {
        self.as_of.unwrap_or_else(|| Utc::now().date_naive())
    }

    pub fn cleanse_options(&self) -> CleanseOptions {
        CleanseOptions {
            as_of: self.as_of(),
            spoilage_threshold: self.spoilage_threshold,
        }
    }
}
