//! Application configuration.
//!
//! Layering, lowest to highest precedence:
//! 1. built-in defaults
//! 2. the TOML config file (`~/.config/murmur/config.toml` or `--config`)
//! 3. environment variables, `MURMUR__SECTION__KEY`

use anyhow::{Context, Result, anyhow, bail};
use ::config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::AuthConfig;

pub const APP_NAME: &str = "murmur";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
    pub hub: HubConfig,
    pub bot: BotConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8081,
        }
    }
}

/// Durable storage settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file. Defaults to `<data dir>/murmur.db`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_path: Option<String>,
}

impl StorageConfig {
    /// Resolve the database file, expanding `~` and environment variables.
    pub fn resolve_database_path(&self, data_dir: &Path) -> Result<PathBuf> {
        match self.database_path.as_deref() {
            Some(path) => expand_str_path(path),
            None => Ok(data_dir.join("murmur.db")),
        }
    }
}

/// Connection hub and session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Outbound frames buffered per connection before new ones are dropped.
    pub outbound_capacity: usize,
    /// Interval between server pings.
    pub ping_interval_secs: u64,
    /// How long a connection may stay silent (no pong) before it is closed.
    pub pong_wait_secs: u64,
    /// Maximum messages replayed per history request.
    pub history_limit: i64,
    /// Upper bound on a single durable-log call.
    pub query_timeout_secs: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: 256,
            ping_interval_secs: 54,
            pong_wait_secs: 60,
            history_limit: 50,
            query_timeout_secs: 5,
        }
    }
}

impl HubConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn pong_wait(&self) -> Duration {
        Duration::from_secs(self.pong_wait_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.outbound_capacity == 0 {
            bail!("hub.outbound_capacity must be at least 1");
        }
        if self.ping_interval_secs == 0 {
            bail!("hub.ping_interval_secs must be at least 1");
        }
        if self.ping_interval_secs >= self.pong_wait_secs {
            bail!(
                "hub.ping_interval_secs ({}) must be shorter than hub.pong_wait_secs ({})",
                self.ping_interval_secs,
                self.pong_wait_secs
            );
        }
        if self.history_limit <= 0 {
            bail!("hub.history_limit must be positive");
        }
        Ok(())
    }
}

/// Market-data bot settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub enabled: bool,
    /// Base URL of the market-data service.
    pub market_data_url: String,
    /// Upper bound on a single bot command.
    pub timeout_secs: u64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            market_data_url: "http://localhost:8000".to_string(),
            timeout_secs: 5,
        }
    }
}

impl BotConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `path` (optional) and the process environment.
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_with_env(path, Environment::with_prefix(&env_prefix()).separator("__"))
    }

    fn load_with_env(path: &Path, environment: Environment) -> Result<Self> {
        let built = Config::builder()
            .add_source(
                File::from(path)
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(environment.try_parsing(true))
            .build()
            .with_context(|| format!("loading configuration from {}", path.display()))?;

        built
            .try_deserialize()
            .context("deserializing configuration")
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        self.auth.validate().context("invalid auth configuration")?;
        self.hub.validate()?;
        if self.bot.enabled && self.bot.timeout_secs == 0 {
            bail!("bot.timeout_secs must be at least 1");
        }
        Ok(())
    }

    /// Default configuration with a freshly generated signing secret.
    pub fn generated() -> Self {
        let mut config = Self::default();
        config.auth.jwt_secret = Some(AuthConfig::generate_jwt_secret());
        config
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("serializing config to TOML")
    }
}

/// Write a default config file with a generated secret.
pub fn write_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {parent:?}"))?;
    }

    let body = format!(
        "# Configuration for {APP_NAME}\n# File: {}\n\n{}",
        path.display(),
        AppConfig::generated().to_toml()?
    );
    fs::write(path, body).with_context(|| format!("writing config file to {}", path.display()))
}

pub fn expand_str_path(text: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(text).context("expanding path")?;
    Ok(PathBuf::from(expanded.to_string()))
}

pub fn default_config_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir).join(APP_NAME));
    }

    if let Some(mut dir) = dirs::config_dir() {
        dir.push(APP_NAME);
        return Ok(dir);
    }

    dirs::home_dir()
        .map(|home| home.join(".config").join(APP_NAME))
        .ok_or_else(|| anyhow!("unable to determine configuration directory"))
}

pub fn default_data_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("XDG_DATA_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir).join(APP_NAME));
    }

    if let Some(mut dir) = dirs::data_dir() {
        dir.push(APP_NAME);
        return Ok(dir);
    }

    dirs::home_dir()
        .map(|home| home.join(".local").join("share").join(APP_NAME))
        .ok_or_else(|| anyhow!("unable to determine data directory"))
}

pub fn env_prefix() -> String {
    APP_NAME
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}
