//! Service configuration
//!
//! Resolution priority: environment (`GENATLAS_*`) overrides TOML file
//! overrides built-in defaults. There is no database tier; these settings are
//! not runtime-editable.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Configuration for the annotation curation service
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP bind address
    pub bind_address: String,
    /// SQLite database path
    pub database_path: PathBuf,
    /// Retention window for cached task records, in hours
    pub task_retention_hours: i64,
    /// Interval between periodic expiry sweeps, in seconds
    pub sweep_interval_secs: u64,
    /// Interval between provider status polls, in seconds
    pub poll_interval_secs: u64,
    /// Hard cap on provider status polls before the job times out
    pub poll_max_attempts: u32,
    /// Base URL of the sequence-similarity search provider
    pub similarity_search_url: String,
    /// Base URL of the protein domain-scan provider
    pub domain_scan_url: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:5740".to_string(),
            database_path: PathBuf::from("genatlas.db"),
            task_retention_hours: 24,
            sweep_interval_secs: 3600,
            poll_interval_secs: 60,
            poll_max_attempts: 10,
            similarity_search_url: "https://blast.ncbi.nlm.nih.gov/api".to_string(),
            domain_scan_url: "https://www.ebi.ac.uk/Tools/services/rest/pfamscan".to_string(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from an optional TOML file, then apply environment
    /// overrides
    pub fn load(toml_path: Option<&Path>) -> Result<Self> {
        let mut config = match toml_path {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(path)
                    .map_err(|e| Error::Config(format!("read {} failed: {}", path.display(), e)))?;
                let parsed: ServiceConfig = toml::from_str(&content)
                    .map_err(|e| Error::Config(format!("parse {} failed: {}", path.display(), e)))?;
                info!("Loaded configuration from {}", path.display());
                parsed
            }
            Some(path) => {
                info!("Config file {} not found, using defaults", path.display());
                ServiceConfig::default()
            }
            None => ServiceConfig::default(),
        };

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(v) = std::env::var("GENATLAS_BIND_ADDRESS") {
            self.bind_address = v;
        }
        if let Ok(v) = std::env::var("GENATLAS_DATABASE_PATH") {
            self.database_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("GENATLAS_TASK_RETENTION_HOURS") {
            self.task_retention_hours = v
                .parse()
                .map_err(|_| Error::Config(format!("invalid GENATLAS_TASK_RETENTION_HOURS: {}", v)))?;
        }
        if let Ok(v) = std::env::var("GENATLAS_SWEEP_INTERVAL_SECS") {
            self.sweep_interval_secs = v
                .parse()
                .map_err(|_| Error::Config(format!("invalid GENATLAS_SWEEP_INTERVAL_SECS: {}", v)))?;
        }
        if let Ok(v) = std::env::var("GENATLAS_POLL_INTERVAL_SECS") {
            self.poll_interval_secs = v
                .parse()
                .map_err(|_| Error::Config(format!("invalid GENATLAS_POLL_INTERVAL_SECS: {}", v)))?;
        }
        if let Ok(v) = std::env::var("GENATLAS_POLL_MAX_ATTEMPTS") {
            self.poll_max_attempts = v
                .parse()
                .map_err(|_| Error::Config(format!("invalid GENATLAS_POLL_MAX_ATTEMPTS: {}", v)))?;
        }
        if let Ok(v) = std::env::var("GENATLAS_SIMILARITY_SEARCH_URL") {
            self.similarity_search_url = v;
        }
        if let Ok(v) = std::env::var("GENATLAS_DOMAIN_SCAN_URL") {
            self.domain_scan_url = v;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.task_retention_hours <= 0 {
            return Err(Error::Config(
                "task_retention_hours must be positive".to_string(),
            ));
        }
        if self.poll_max_attempts == 0 {
            return Err(Error::Config("poll_max_attempts must be positive".to_string()));
        }
        Ok(())
    }
}
