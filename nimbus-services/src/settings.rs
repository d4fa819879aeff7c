// SPDX-License-Identifier: LGPL-3.0-only
use crate::config::CacheConfig;
use anyhow::Result;
use nimbus_core::MonitorConfig;
use serde::Deserialize;
use smol::fs;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use xdg::BaseDirectories;

/// The on-disk configuration, as parsed from `config.toml`.
///
/// Every value is optional so that files layered on top of each other only
/// override what they mention.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Thumbnail cache settings
    #[serde(default)]
    pub cache: CacheSettings,
    /// Download monitor settings
    #[serde(default)]
    pub monitor: MonitorSettings,
    /// Any other sections are captured here
    #[serde(flatten)]
    pub other: HashMap<String, toml::Value>,
}

/// `[cache]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheSettings {
    pub root: Option<PathBuf>,
    pub memory_max_entries: Option<usize>,
    pub memory_max_bytes: Option<usize>,
    pub disk_max_bytes: Option<u64>,
    pub disk_high_watermark: Option<f64>,
    pub disk_low_watermark: Option<f64>,
    pub sweep_interval_ms: Option<u64>,
}

/// `[monitor]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MonitorSettings {
    pub throttle_interval_ms: Option<u64>,
}

/// Layered settings for the thumbnail service.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    config: Config,
}

impl Settings {
    /// Load settings from the standard locations.
    pub async fn new() -> Result<Self> {
        let mut settings = Self::default();
        settings.load().await?;
        Ok(settings)
    }

    /// Parse a single TOML document.
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(Self {
            config: toml::from_str(content)?,
        })
    }

    /// Load configuration from standard locations in precedence order.
    ///
    /// Order (later overrides earlier):
    /// 1. System Data: /usr/share/nimbus/config.toml (and XDG_DATA_DIRS)
    /// 2. System Config: /etc/xdg/nimbus/config.toml (and XDG_CONFIG_DIRS)
    /// 3. User Config: ~/.config/nimbus/config.toml (XDG_CONFIG_HOME)
    pub async fn load(&mut self) -> Result<()> {
        let xdg_dirs = BaseDirectories::with_prefix("nimbus")?;
        let filename = "config.toml";

        // 1. Load from system data directories
        for path in xdg_dirs.find_data_files(filename).rev() {
            self.load_file(&path).await;
        }

        // 2. Load from system config directories
        for path in xdg_dirs.find_config_files(filename).rev() {
            self.load_file(&path).await;
        }

        // 3. Load from user config directory
        let user_config_path = xdg_dirs.get_config_home().join(filename);
        if user_config_path.exists() {
            self.load_file(&user_config_path).await;
        }

        Ok(())
    }

    async fn load_file(&mut self, path: &Path) {
        log::info!("Loading config from: {:?}", path);
        match fs::read_to_string(path).await {
            Ok(content) => match toml::from_str::<Config>(&content) {
                Ok(loaded_config) => {
                    self.merge(loaded_config);
                },
                Err(e) => {
                    log::error!("Failed to parse config file {:?}: {}", path, e);
                },
            },
            Err(e) => {
                log::warn!("Failed to read config file {:?}: {}", path, e);
            },
        }
    }

    /// Load configuration from explicit paths, in order.
    pub async fn load_from_paths_async(&mut self, paths: Vec<PathBuf>) -> Vec<Result<()>> {
        let mut results = Vec::new();

        for path in paths {
            let result = async {
                let content = fs::read_to_string(&path)
                    .await
                    .map_err(|e| anyhow::anyhow!("Failed to read config file {:?}: {}", path, e))?;

                let loaded_config: Config = toml::from_str(&content)
                    .map_err(|e| anyhow::anyhow!("Failed to parse config file {:?}: {}", path, e))?;

                self.merge(loaded_config);
                Ok(())
            }
            .await;

            results.push(result);
        }

        results
    }

    /// Merge a loaded config into the current config.
    pub fn merge(&mut self, other: Config) {
        let Config {
            cache,
            monitor,
            other,
        } = other;

        let current = &mut self.config.cache;
        overlay(&mut current.root, cache.root);
        overlay(&mut current.memory_max_entries, cache.memory_max_entries);
        overlay(&mut current.memory_max_bytes, cache.memory_max_bytes);
        overlay(&mut current.disk_max_bytes, cache.disk_max_bytes);
        overlay(&mut current.disk_high_watermark, cache.disk_high_watermark);
        overlay(&mut current.disk_low_watermark, cache.disk_low_watermark);
        overlay(&mut current.sweep_interval_ms, cache.sweep_interval_ms);

        overlay(
            &mut self.config.monitor.throttle_interval_ms,
            monitor.throttle_interval_ms,
        );

        self.config.other.extend(other);
    }

    /// Get the current configuration.
    pub fn get(&self) -> &Config {
        &self.config
    }

    /// Cache configuration with defaults filled in and watermarks validated.
    pub fn cache_config(&self) -> CacheConfig {
        let cache = &self.config.cache;
        let defaults = CacheConfig::default();
        CacheConfig {
            root: cache.root.clone().unwrap_or(defaults.root),
            memory_max_entries: cache.memory_max_entries.unwrap_or(defaults.memory_max_entries),
            memory_max_bytes: cache.memory_max_bytes.unwrap_or(defaults.memory_max_bytes),
            disk_max_bytes: cache.disk_max_bytes.unwrap_or(defaults.disk_max_bytes),
            disk_high_watermark: cache
                .disk_high_watermark
                .unwrap_or(defaults.disk_high_watermark),
            disk_low_watermark: cache.disk_low_watermark.unwrap_or(defaults.disk_low_watermark),
            sweep_interval: cache
                .sweep_interval_ms
                .map_or(defaults.sweep_interval, Duration::from_millis),
        }
        .validated()
    }

    /// Monitor configuration with defaults filled in.
    pub fn monitor_config(&self) -> MonitorConfig {
        match self.config.monitor.throttle_interval_ms {
            Some(ms) => MonitorConfig::default().with_throttle_interval(Duration::from_millis(ms)),
            None => MonitorConfig::default(),
        }
    }
}

fn overlay<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}
