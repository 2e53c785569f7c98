use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use crate::provider::ProviderId;

const DEFAULT_CACHE_DURATION_MINUTES: u32 = 10;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_COUNTRY: &str = "RU";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_SERVER_PORT: u16 = 8080;

/// Configuration for a single provider (e.g., API key).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_key: String,
}

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Example TOML:
    /// [providers.openweather]
    /// api_key = "..."
    pub providers: HashMap<String, ProviderConfig>,

    /// How long an aggregated result is served from cache.
    pub cache_duration_minutes: u32,

    /// Deadline for one fan-out round across all providers.
    pub request_timeout_secs: u64,

    /// Country code used when the caller doesn't give one.
    pub default_country: String,

    /// Fallback `tracing` filter when `RUST_LOG` is unset.
    pub log_level: String,

    /// Port the HTTP front end listens on.
    pub server_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
            cache_duration_minutes: DEFAULT_CACHE_DURATION_MINUTES,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            default_country: DEFAULT_COUNTRY.to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            server_port: DEFAULT_SERVER_PORT,
        }
    }
}

impl Config {
    /// Load config from disk (or defaults on first run), then apply
    /// environment overrides. Call [`load_dotenv`] first to pick up `.env`.
    pub fn load() -> Result<Self> {
        let mut cfg = Self::load_file()?;
        cfg.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(cfg)
    }

    /// Load only the on-disk file, without environment overrides.
    pub fn load_file() -> Result<Self> {
        let path = Self::config_file_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Invalid configuration TOML")
    }

    /// Apply overrides from a variable lookup. Unparseable numbers are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(key) = non_empty("OPENWEATHER_API_KEY") {
            self.upsert_provider_api_key(ProviderId::OpenWeather, key);
        }
        if let Some(key) = non_empty("WEATHERAPI_API_KEY") {
            self.upsert_provider_api_key(ProviderId::WeatherApi, key);
        }
        if let Some(minutes) = non_empty("CACHE_DURATION").and_then(|v| v.parse::<u32>().ok()) {
            self.cache_duration_minutes = minutes;
        }
        if let Some(secs) = non_empty("REQUEST_TIMEOUT").and_then(|v| v.parse::<u64>().ok()) {
            self.request_timeout_secs = secs;
        }
        if let Some(country) = non_empty("DEFAULT_COUNTRY") {
            self.default_country = country;
        }
        if let Some(level) = non_empty("LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(port) = non_empty("SERVER_PORT").and_then(|v| v.parse::<u16>().ok()) {
            self.server_port = port;
        }
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_file_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(&path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "weather-aggregator", "weather")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Set or replace a provider's API key.
    pub fn upsert_provider_api_key(&mut self, provider_id: ProviderId, api_key: String) {
        self.providers.insert(provider_id.as_str().to_string(), ProviderConfig { api_key });
    }

    /// Returns API key for a provider, if present.
    pub fn provider_api_key(&self, provider_id: ProviderId) -> Option<&str> {
        self.providers.get(provider_id.as_str()).map(|cfg| cfg.api_key.as_str())
    }

    pub fn is_provider_configured(&self, provider_id: ProviderId) -> bool {
        self.provider_api_key(provider_id)
            .is_some_and(|key| !key.is_empty())
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.cache_duration_minutes))
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }
}

/// Load `.env` from the working directory into the process environment.
///
/// A missing file is not an error. Returns the path that was loaded, if any.
pub fn load_dotenv() -> Result<Option<PathBuf>, dotenvy::Error> {
    skip_missing(dotenvy::dotenv())
}

/// Like [`load_dotenv`], for an explicit file.
pub fn load_dotenv_from(path: &Path) -> Result<Option<PathBuf>, dotenvy::Error> {
    let loaded = dotenvy::from_path(path).map(|()| path.to_path_buf());
    skip_missing(loaded)
}

fn skip_missing(
    result: Result<PathBuf, dotenvy::Error>,
) -> Result<Option<PathBuf>, dotenvy::Error> {
    match result {
        Ok(path) => Ok(Some(path)),
        Err(err) if err.not_found() => Ok(None),
        Err(err) => Err(err),
    }
}
