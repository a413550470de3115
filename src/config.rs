use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::engine::window::{known_period, DEFAULT_PERIOD};

/// Top-level configuration for the cellscope service.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Logging verbosity (debug, info, warn, error). Default: "info".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Measurement storage configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Aggregation defaults.
    #[serde(default)]
    pub stats: StatsConfig,
}

/// HTTP server configuration.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Listen address. ":5000" shorthand binds all interfaces. Default: ":5000".
    #[serde(default = "default_listen_addr")]
    pub addr: String,
}

/// Measurement storage configuration.
#[derive(Debug, Default, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL (postgres:// or sqlite:). Empty selects the in-memory
    /// store, which loses data on restart.
    #[serde(default)]
    pub url: String,
}

/// Aggregation defaults.
#[derive(Debug, Deserialize)]
pub struct StatsConfig {
    /// Relative period applied when a stats request names none. Default: "1h".
    #[serde(default = "default_period")]
    pub default_period: String,

    /// Cap on user-series point counts. Requests may ask for fewer but
    /// never more. Default: 500.
    #[serde(default = "default_max_series_points")]
    pub max_series_points: usize,

    /// Budget for one store fetch; exceeding it is treated as a fetch
    /// failure. Default: 10s.
    #[serde(default = "default_fetch_timeout", with = "humantime_serde")]
    pub fetch_timeout: Duration,
}

// --- Default value functions ---

fn default_log_level() -> String {
    "info".to_string()
}

fn default_listen_addr() -> String {
    ":5000".to_string()
}

fn default_period() -> String {
    DEFAULT_PERIOD.to_string()
}

fn default_max_series_points() -> usize {
    500
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(10)
}

// --- Default trait impls ---

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            stats: StatsConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_listen_addr(),
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            default_period: default_period(),
            max_series_points: default_max_series_points(),
            fetch_timeout: default_fetch_timeout(),
        }
    }
}

// --- Validation and loading ---

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;

        let cfg: Config = serde_yaml::from_str(&data)
            .with_context(|| format!("parsing config file {}", path.display()))?;

        cfg.validate()?;

        Ok(cfg)
    }

    /// Validate the configuration for required fields and consistency.
    pub fn validate(&self) -> Result<()> {
        if self.server.addr.is_empty() {
            bail!("server.addr is required");
        }

        if !known_period(&self.stats.default_period) {
            bail!(
                "stats.default_period is not a known period token: {}",
                self.stats.default_period
            );
        }

        if self.stats.max_series_points == 0 {
            bail!("stats.max_series_points must be positive");
        }

        if self.stats.fetch_timeout.is_zero() {
            bail!("stats.fetch_timeout must be positive");
        }

        if !self.database.url.is_empty()
            && !self.database.url.starts_with("postgres://")
            && !self.database.url.starts_with("postgresql://")
            && !self.database.url.starts_with("sqlite:")
        {
            bail!("database.url must be a postgres:// or sqlite: URL");
        }

        Ok(())
    }
}
