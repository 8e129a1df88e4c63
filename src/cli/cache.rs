//! Cache management commands

use chrono::DateTime;
use colored::Colorize;

use crate::cache::{CacheStore, SqliteCacheStore};
use crate::cli::OutputFormat;
use crate::cli::args::GlobalOptions;
use crate::cli::context::{cache_dir, open_store};
use crate::config::Config;
use crate::error::{ConfigError, Error, Result};
use crate::models::display::{SnapshotDisplay, format_size};
use crate::output::{format_json, format_table};

/// Cache commands work without a config file, falling back to defaults
fn load_config(opts: &GlobalOptions) -> Result<Config> {
    match Config::load_at(opts.config_ref()) {
        Err(Error::Config(ConfigError::NotFound)) => Ok(Config::default()),
        other => other,
    }
}

fn format_epoch(secs: Option<i64>) -> Option<String> {
    secs.and_then(|s| DateTime::from_timestamp(s, 0)).map(|d| {
        d.with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M")
            .to_string()
    })
}

/// Show cache status/statistics
pub fn status(opts: &GlobalOptions) -> Result<()> {
    let config = load_config(opts)?;
    let store: SqliteCacheStore = open_store(&config)?;
    let stats = store.stats()?;
    let rows: Vec<SnapshotDisplay> = store.list_meta()?.iter().map(SnapshotDisplay::from).collect();
    let path = cache_dir(&config)?.display().to_string();

    match opts.format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "path": path,
                "total_snapshots": stats.total_snapshots,
                "healthy_snapshots": stats.healthy_snapshots,
                "total_entities": stats.total_entities,
                "total_size_bytes": stats.total_size_bytes,
                "total_size_human": format_size(stats.total_size_bytes),
                "oldest_refresh_timestamp": stats.oldest_refresh,
                "newest_refresh_timestamp": stats.newest_refresh,
                "snapshots": rows,
            });
            println!("{}", format_json(&json)?);
        }
        _ => {
            println!("{}", "Cache Status".bold());
            println!("────────────────────────────────────────");
            println!("Location:       {}", path.cyan());
            println!(
                "Snapshots:      {} ({} healthy)",
                stats.total_snapshots, stats.healthy_snapshots
            );
            println!("Entities:       {}", stats.total_entities);
            println!("Total size:     {}", format_size(stats.total_size_bytes));

            if let Some(oldest) = format_epoch(stats.oldest_refresh) {
                println!("Oldest refresh: {}", oldest);
            }
            if let Some(newest) = format_epoch(stats.newest_refresh) {
                println!("Newest refresh: {}", newest);
            }

            println!();
            println!("{}", format_table(&rows, "No snapshots cached."));
        }
    }

    Ok(())
}

/// Clear every snapshot, or one platform's snapshot
pub async fn clear(opts: &GlobalOptions, platform: Option<&str>) -> Result<()> {
    let config = load_config(opts)?;
    let store = open_store(&config)?;

    let removed = match platform {
        Some(id) => usize::from(store.delete_snapshot(id).await?),
        None => store.clear_all().await?,
    };

    match opts.format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "snapshots_removed": removed,
                "platform": platform,
                "success": true,
            });
            println!("{}", format_json(&json)?);
        }
        _ => match (removed, platform) {
            (0, Some(id)) => println!("No snapshot cached for {}", id),
            (0, None) => println!("Cache was already empty"),
            (_, Some(id)) => println!("Cleared snapshot for {}", id),
            (n, None) => println!("Cleared {} snapshots", n),
        },
    }

    Ok(())
}

/// Show cache path
pub fn path(opts: &GlobalOptions) -> Result<()> {
    let config = load_config(opts)?;
    println!("{}", cache_dir(&config)?.display());
    Ok(())
}
