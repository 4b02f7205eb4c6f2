//! Configuration Manager

use super::Config;
use crate::Result;
use anyhow::{bail, Context};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

pub const ENV_BIND_ADDR: &str = "TINYSOCKS_BIND_ADDR";
pub const ENV_BUFFER_SIZE: &str = "TINYSOCKS_BUFFER_SIZE";
pub const ENV_CONNECT_TIMEOUT: &str = "TINYSOCKS_CONNECT_TIMEOUT";
pub const ENV_LOG_LEVEL: &str = "TINYSOCKS_LOG_LEVEL";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const MIN_BUFFER_SIZE: usize = 512;
const MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// Manages configuration loading and validation
pub struct ConfigManager;

impl ConfigManager {
    /// Resolve configuration from defaults, the process environment and `path`
    pub fn load(path: &Path) -> Result<Config> {
        Self::load_layered(path, |key| std::env::var(key).ok())
    }

    /// Layer defaults, then `lookup`, then whatever keys the file at `path` sets.
    ///
    /// A missing file contributes nothing. Validation runs once on the result.
    pub fn load_layered<F>(path: &Path, lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        Self::apply_env(&mut config, &lookup)?;

        if path.exists() {
            config = Self::overlay_file(config, path)?;
        } else {
            tracing::warn!("Configuration file not found at {}, using defaults", path.display());
        }

        config.validate().context("Configuration validation failed")?;
        Ok(config)
    }

    /// Load configuration from file
    pub fn load_from_file(path: &Path) -> Result<Config> {
        Self::load_layered(path, |_| None)
    }

    /// Load configuration from environment variables
    pub fn load_from_env() -> Result<Config> {
        Self::load_from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from defaults overridden by `lookup`
    pub fn load_from_lookup<F>(lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        Self::apply_env(&mut config, &lookup)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env<F>(config: &mut Config, lookup: &F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind_addr) = lookup(ENV_BIND_ADDR) {
            config.server.bind_addr = bind_addr
                .parse::<SocketAddr>()
                .with_context(|| format!("Invalid {}: {}", ENV_BIND_ADDR, bind_addr))?;
        }

        if let Some(buffer_size) = lookup(ENV_BUFFER_SIZE) {
            config.server.buffer_size = buffer_size
                .parse::<usize>()
                .with_context(|| format!("Invalid {}: {}", ENV_BUFFER_SIZE, buffer_size))?;
        }

        if let Some(connect_timeout) = lookup(ENV_CONNECT_TIMEOUT) {
            let parsed = humantime::parse_duration(&connect_timeout)
                .with_context(|| format!("Invalid {}: {}", ENV_CONNECT_TIMEOUT, connect_timeout))?;
            config.server.connect_timeout = Some(parsed);
        }

        if let Some(log_level) = lookup(ENV_LOG_LEVEL) {
            config.logging.level = log_level;
        }

        Ok(())
    }

    /// Apply only the keys present in the file on top of `base`
    fn overlay_file(base: Config, path: &Path) -> Result<Config> {
        tracing::info!("Loading configuration from: {}", path.display());
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let overlay: toml::Table = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        let mut merged = match toml::Value::try_from(&base).context("Failed to serialize configuration")? {
            toml::Value::Table(table) => table,
            other => bail!("Configuration serialized to a non-table value: {}", other.type_str()),
        };
        merge_tables(&mut merged, overlay);

        let config = toml::Value::Table(merged)
            .try_into()
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;

        tracing::info!("Configuration loaded from {}", path.display());
        Ok(config)
    }
}

/// Recursively copy `overlay` into `base`; nested tables merge key by key
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(nested)) => merge_tables(existing, nested),
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.validate_server_config()
            .context("Server configuration validation failed")?;

        self.validate_logging_config()
            .context("Logging configuration validation failed")?;

        Ok(())
    }

    fn validate_server_config(&self) -> Result<()> {
        if self.server.buffer_size < MIN_BUFFER_SIZE {
            bail!("buffer_size must be at least {} bytes", MIN_BUFFER_SIZE);
        }

        if self.server.buffer_size > MAX_BUFFER_SIZE {
            bail!("buffer_size cannot exceed 1MB");
        }

        if self.server.shutdown_timeout.is_zero() {
            bail!("shutdown_timeout must be greater than 0");
        }

        if matches!(self.server.connect_timeout, Some(t) if t.is_zero()) {
            bail!("connect_timeout must be greater than 0 when set");
        }

        Ok(())
    }

    fn validate_logging_config(&self) -> Result<()> {
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            bail!("logging.level must be one of: {}", VALID_LOG_LEVELS.join(", "));
        }

        Ok(())
    }

    /// Apply command-line overrides
    pub fn merge_with_cli_args(
        &mut self,
        bind: Option<&str>,
        port: Option<u16>,
        buffer_size: Option<usize>,
        connect_timeout: Option<u64>,
    ) -> Result<()> {
        if let Some(bind_str) = bind {
            let addr = bind_str
                .parse::<SocketAddr>()
                .with_context(|| format!("Invalid bind address: {}", bind_str))?;
            self.server.bind_addr = addr;
            tracing::info!("CLI override: bind address set to {}", addr);
        }

        if let Some(port) = port {
            self.server.bind_addr.set_port(port);
            tracing::info!("CLI override: port set to {}", port);
        }

        if let Some(buffer_size) = buffer_size {
            self.server.buffer_size = buffer_size;
            tracing::info!("CLI override: buffer size set to {} bytes", buffer_size);
        }

        if let Some(secs) = connect_timeout {
            self.server.connect_timeout = Some(Duration::from_secs(secs));
            tracing::info!("CLI override: connect timeout set to {}s", secs);
        }

        Ok(())
    }
}
