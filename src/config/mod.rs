//! Configuration management for ctiscan

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::CacheTtl;
use crate::error::{ConfigError, Result};
use crate::matcher::{CategoryFilter, MIN_KEY_CHARS, ScanOptions};
use crate::models::{EntityType, PlatformFamily};
use crate::scheduler::{PlatformRegistry, RefreshIntervals};
use crate::source::rate_limit::DEFAULT_REQUESTS_PER_SECOND;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Configured platform instances
    #[serde(default)]
    pub platforms: Vec<PlatformConfig>,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub scan: ScanConfig,
}

/// One platform instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Stable identifier, used as the snapshot key
    pub id: String,

    /// Display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub family: PlatformFamily,

    /// Base URL, e.g. `https://opencti.example.com`
    pub url: String,

    /// API token sent as a bearer token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Request rate once the platform has answered 429
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
}

impl PlatformConfig {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }
}

fn default_requests_per_second() -> u32 {
    DEFAULT_REQUESTS_PER_SECOND
}

/// Refresh scheduler timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Interval after a fully healthy pass
    #[serde(default = "default_long_interval")]
    pub long_interval_secs: u64,

    /// Interval after a pass with failures
    #[serde(default = "default_short_interval")]
    pub short_interval_secs: u64,

    /// How long a forced refresh waits for an in-flight pass
    #[serde(default = "default_force_wait")]
    pub force_wait_secs: u64,

    /// Category fetches run concurrently per platform
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_fetches: usize,
}

fn default_long_interval() -> u64 {
    30 * 60
}

fn default_short_interval() -> u64 {
    5 * 60
}

fn default_force_wait() -> u64 {
    30
}

fn default_max_concurrent() -> usize {
    8
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            long_interval_secs: default_long_interval(),
            short_interval_secs: default_short_interval(),
            force_wait_secs: default_force_wait(),
            max_concurrent_fetches: default_max_concurrent(),
        }
    }
}

/// Snapshot storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Override for the cache directory (defaults to ~/.cache/ctiscan)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,

    /// Snapshot age that makes a platform due for refresh
    #[serde(default = "default_refresh_threshold")]
    pub refresh_threshold_secs: u64,
}

fn default_refresh_threshold() -> u64 {
    CacheTtl::REFRESH_THRESHOLD.as_secs()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            refresh_threshold_secs: default_refresh_threshold(),
        }
    }
}

/// Default scan behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Only emit these types (all types when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_types: Option<Vec<EntityType>>,

    /// Never emit these types
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_types: Vec<EntityType>,

    #[serde(default = "default_min_key_length")]
    pub min_key_length: usize,
}

fn default_min_key_length() -> usize {
    MIN_KEY_CHARS
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            include_types: None,
            exclude_types: Vec::new(),
            min_key_length: default_min_key_length(),
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::Invalid(
            "Could not determine home directory".to_string(),
        ))?;

        Ok(home.join(".ctiscan").join("config.yaml"))
    }

    /// Resolve an optional override to a concrete path
    pub fn resolve_path(path: Option<&str>) -> Result<PathBuf> {
        match path {
            Some(p) => Ok(PathBuf::from(p)),
            None => Self::default_path(),
        }
    }

    /// Load configuration from the override path or the default path
    pub fn load_at(path: Option<&str>) -> Result<Self> {
        Self::load_from(Self::resolve_path(path)?)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound.into());
        }

        let contents = std::fs::read_to_string(&path)?;
        let config: Config = serde_yaml::from_str(&contents).map_err(ConfigError::from)?;
        config.validate()?;

        Ok(config)
    }

    /// Save configuration to the override path or the default path
    pub fn save_at(&self, path: Option<&str>) -> Result<()> {
        self.save_to(Self::resolve_path(path)?)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: PathBuf) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents =
            serde_yaml::to_string(self).map_err(|e| ConfigError::SaveError(e.to_string()))?;

        std::fs::write(&path, contents)?;

        // Tokens live in this file: 600 on Unix systems
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(&path)?.permissions();
            perms.set_mode(0o600);
            std::fs::set_permissions(&path, perms)?;
        }

        Ok(())
    }

    /// Check platform ids, URLs and scheduler timing
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for platform in &self.platforms {
            if platform.id.trim().is_empty() {
                return Err(ConfigError::Invalid("platform id must not be empty".to_string()).into());
            }
            if !seen.insert(platform.id.as_str()) {
                return Err(
                    ConfigError::Invalid(format!("duplicate platform id '{}'", platform.id)).into(),
                );
            }
            if !(platform.url.starts_with("http://") || platform.url.starts_with("https://")) {
                return Err(ConfigError::Invalid(format!(
                    "platform '{}' url must start with http:// or https://",
                    platform.id
                ))
                .into());
            }
        }

        let s = &self.scheduler;
        if s.long_interval_secs == 0 || s.short_interval_secs == 0 {
            return Err(
                ConfigError::Invalid("scheduler intervals must be non-zero".to_string()).into(),
            );
        }

        Ok(())
    }

    /// Add a platform or replace the one with the same id
    pub fn upsert_platform(&mut self, platform: PlatformConfig) {
        match self.platforms.iter_mut().find(|p| p.id == platform.id) {
            Some(existing) => *existing = platform,
            None => self.platforms.push(platform),
        }
    }

    pub fn platform(&self, id: &str) -> Option<&PlatformConfig> {
        self.platforms.iter().find(|p| p.id == id)
    }

    pub fn refresh_intervals(&self) -> RefreshIntervals {
        RefreshIntervals {
            long: Duration::from_secs(self.scheduler.long_interval_secs),
            short: Duration::from_secs(self.scheduler.short_interval_secs),
            force_wait: Duration::from_secs(self.scheduler.force_wait_secs),
            max_concurrent_fetches: self.scheduler.max_concurrent_fetches,
        }
    }

    pub fn refresh_threshold(&self) -> Duration {
        Duration::from_secs(self.cache.refresh_threshold_secs)
    }

    pub fn category_filter(&self) -> CategoryFilter {
        CategoryFilter {
            include: self
                .scan
                .include_types
                .as_ref()
                .map(|types| types.iter().copied().collect()),
            exclude: self.scan.exclude_types.iter().copied().collect(),
        }
    }

    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            min_key_chars: self.scan.min_key_length,
        }
    }
}

impl PlatformRegistry for Config {
    fn configured_platforms(&self, family: PlatformFamily) -> Vec<String> {
        self.platforms
            .iter()
            .filter(|p| p.family == family)
            .map(|p| p.id.clone())
            .collect()
    }
}
