use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, ConfigBuilder, Environment, File, builder::DefaultState};
use serde::Deserialize;

use crate::loader::{DEFAULT_BATCH_SIZE, ITEMS_PER_PAGE};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub network: NetworkConfig,
    pub loading: LoadingConfig,
    pub live: LiveUpdatesConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub url: String,
    pub api_key: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NetworkConfig {
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoadingConfig {
    /// Pages fetched concurrently in each batch.
    pub batch_size: usize,
    pub items_per_page: u32,
}

impl Default for LoadingConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            items_per_page: ITEMS_PER_PAGE,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LiveUpdatesConfig {
    pub enabled: bool,
    /// Minutes to buffer created visits before flushing them. `None` or 0
    /// flushes every visit as soon as it arrives.
    pub interval_mins: Option<u64>,
}

impl Default for LiveUpdatesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_mins: None,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("shlink-visits");

        let builder = Self::defaults()?
            // 2. Local config file (optional, lowest priority)
            .add_source(File::from(PathBuf::from("config.toml")).required(false))
            // 3. User config directory (optional, overrides local)
            .add_source(File::from(config_dir.join("config.toml")).required(false))
            // 4. Environment variables (SHLINK_VISITS__SERVER__URL=...)
            .add_source(Environment::with_prefix("SHLINK_VISITS").separator("__"));

        let s = builder.build()?;
        Ok(s.try_deserialize()?)
    }

    /// Load defaults overridden by one explicit file, then the environment.
    pub fn load_from(path: &Path) -> Result<Self> {
        let builder = Self::defaults()?
            .add_source(File::from(path.to_path_buf()).required(true))
            .add_source(Environment::with_prefix("SHLINK_VISITS").separator("__"));

        let s = builder
            .build()
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Ok(s.try_deserialize()?)
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>> {
        // Load .env file (silently ignore if not present - production uses env vars directly)
        let _ = dotenvy::dotenv();
        Self::default_builder()
    }

    /// Defaults from the process environment only, without reading `.env`.
    fn default_builder() -> Result<ConfigBuilder<DefaultState>> {
        let api_key = std::env::var("SHLINK_API_KEY")
            .context("SHLINK_API_KEY must be set (via .env file or environment variable)")?;

        // 1. Default values
        let builder = Config::builder()
            // Server
            .set_default("server.url", "http://localhost:8080")?
            .set_default("server.api_key", api_key)?
            // Network
            .set_default("network.request_timeout_secs", 30)?
            .set_default("network.connect_timeout_secs", 10)?
            // Loading
            .set_default("loading.batch_size", DEFAULT_BATCH_SIZE as u64)?
            .set_default("loading.items_per_page", u64::from(ITEMS_PER_PAGE))?
            // Live updates
            .set_default("live.enabled", true)?;

        Ok(builder)
    }
}
