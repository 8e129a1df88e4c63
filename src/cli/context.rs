//! Command execution context
//!
//! Loads the configuration and opens the snapshot store once, so command
//! handlers don't repeat the boilerplate.

use std::path::PathBuf;
use std::sync::Arc;

use crate::cache::{CacheStorage, CacheStore, SqliteCacheStore};
use crate::cli::OutputFormat;
use crate::cli::args::GlobalOptions;
use crate::config::Config;
use crate::error::{ConfigError, Result};
use crate::models::PlatformCacheSnapshot;
use crate::scheduler::RefreshService;
use crate::source::HttpEntitySource;

/// Context for command execution: configuration, snapshot store and output format.
pub struct CommandContext {
    /// Loaded and validated configuration
    pub config: Config,
    /// Snapshot store (Arc-wrapped so schedulers can share it)
    pub store: Arc<SqliteCacheStore>,
    /// Output format preference
    pub format: OutputFormat,
}

impl CommandContext {
    /// Load the config and open the store it points at.
    ///
    /// # Errors
    /// Returns error if the config cannot be loaded or the cache cannot be opened.
    pub fn new(opts: &GlobalOptions) -> Result<Self> {
        let config = Config::load_at(opts.config_ref())?;
        let store = Arc::new(open_store(&config)?);

        Ok(Self {
            config,
            store,
            format: opts.format,
        })
    }

    /// Fail with a hint when no platform is configured
    pub fn require_platforms(&self) -> Result<()> {
        if self.config.platforms.is_empty() {
            return Err(ConfigError::NoPlatforms.into());
        }
        Ok(())
    }

    /// Refresh service wired to the configured platforms over HTTP
    pub fn refresh_service(&self) -> Result<RefreshService> {
        let source = HttpEntitySource::new(&self.config.platforms)?;

        Ok(RefreshService::new(
            Arc::new(source),
            self.store.clone(),
            Arc::new(self.config.clone()),
            self.config.refresh_intervals(),
        ))
    }

    /// Snapshots of platforms that are still configured, in config order
    pub async fn configured_snapshots(&self) -> Result<Vec<PlatformCacheSnapshot>> {
        let mut snapshots = Vec::new();
        for platform in &self.config.platforms {
            if let Some(snapshot) = self.store.load_snapshot(&platform.id).await? {
                snapshots.push(snapshot);
            }
        }
        Ok(snapshots)
    }
}

/// Cache directory for a config: `cache.dir` or the user cache directory
pub fn cache_dir(config: &Config) -> Result<PathBuf> {
    match &config.cache.dir {
        Some(dir) => Ok(dir.clone()),
        None => Ok(CacheStorage::cache_dir()?),
    }
}

/// Open the snapshot store a config points at
pub fn open_store(config: &Config) -> Result<SqliteCacheStore> {
    let store = SqliteCacheStore::open_at(&cache_dir(config)?)?;
    Ok(store.with_refresh_threshold(config.refresh_threshold()))
}
