//! Configuration loading from TOML files

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use archiscribe_archive::ArchiveConfig;
use archiscribe_cache::{FillPolicy, WatcherConfig};
use archiscribe_core::HttpConfig;
use serde::Deserialize;

/// Global configuration for archiscribe
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
    pub fill: FillConfig,
    pub archive: ArchiveConfig,
    pub http: HttpSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache root; `ARCHISCRIBE_CACHE` takes precedence
    pub root: Option<PathBuf>,
    pub min_stock: usize,
    /// Years to keep stocked (empty: years found on disk, else all indexed)
    pub years: Vec<i32>,
    pub grace_period_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: None,
            min_stock: 3,
            years: Vec::new(),
            grace_period_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct FillConfig {
    pub max_fetch_failures: u32,
    pub max_candidates: u32,
    pub fetch_timeout_secs: u64,
    pub backoff_base_secs: u64,
    pub max_backoff_secs: u64,
}

impl Default for FillConfig {
    fn default() -> Self {
        Self {
            max_fetch_failures: 3,
            max_candidates: 200,
            fetch_timeout_secs: 300,
            backoff_base_secs: 5,
            max_backoff_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub connect_timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            max_retries: 3,
        }
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./archiscribe.toml (current directory)
    /// 2. ~/.config/archiscribe/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("archiscribe.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "archiscribe") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        anyhow::ensure!(
            config.archive.year_from <= config.archive.year_to,
            "archive.year_from ({}) is after archive.year_to ({})",
            config.archive.year_from,
            config.archive.year_to
        );
        anyhow::ensure!(config.cache.min_stock > 0, "cache.min_stock must be at least 1");

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn fill_policy(&self) -> FillPolicy {
        FillPolicy {
            max_fetch_failures: self.fill.max_fetch_failures,
            max_candidates: self.fill.max_candidates,
            fetch_timeout: Duration::from_secs(self.fill.fetch_timeout_secs),
        }
    }

    pub fn watcher_config(&self) -> WatcherConfig {
        WatcherConfig {
            min_stock: self.cache.min_stock,
            backoff_base: Duration::from_secs(self.fill.backoff_base_secs),
            max_backoff: Duration::from_secs(self.fill.max_backoff_secs),
            grace_period: Duration::from_secs(self.cache.grace_period_secs),
        }
    }

    pub fn http_config(&self) -> HttpConfig {
        HttpConfig {
            connect_timeout: Duration::from_secs(self.http.connect_timeout_secs),
            max_retries: self.http.max_retries,
        }
    }
}
