//! Status command implementation

use chrono::Utc;
use colored::Colorize;
use serde::Serialize;

use crate::cache::{CacheStore, SnapshotMeta};
use crate::cli::args::GlobalOptions;
use crate::cli::{CommandContext, OutputFormat};
use crate::config::Config;
use crate::error::Result;
use crate::models::display::format_age;
use crate::output::format_json;

#[derive(Debug, Serialize)]
struct PlatformStatus {
    id: String,
    name: String,
    family: String,
    url: String,
    token_configured: bool,
    entity_count: usize,
    refreshed_at: Option<String>,
    last_refresh_succeeded: Option<bool>,
    due_for_refresh: bool,
}

/// Run the status command to display configuration and cache state
pub async fn run(opts: &GlobalOptions) -> Result<()> {
    let config_path = Config::resolve_path(opts.config_ref())?;

    let ctx = match CommandContext::new(opts) {
        Ok(ctx) => ctx,
        Err(crate::error::Error::Config(crate::error::ConfigError::NotFound)) => {
            return not_configured(opts.format, &config_path.display().to_string());
        }
        Err(e) => return Err(e),
    };

    let metas = ctx.store.list_meta()?;
    let mut platforms = Vec::new();
    for platform in &ctx.config.platforms {
        let meta: Option<&SnapshotMeta> = metas.iter().find(|m| m.platform_id == platform.id);
        platforms.push(PlatformStatus {
            id: platform.id.clone(),
            name: platform.display_name().to_string(),
            family: platform.family.to_string(),
            url: platform.url.clone(),
            token_configured: platform.token.is_some(),
            entity_count: meta.map(|m| m.entity_count).unwrap_or(0),
            refreshed_at: meta.and_then(|m| m.refreshed_at).map(|t| t.to_rfc3339()),
            last_refresh_succeeded: meta.map(|m| m.succeeded),
            due_for_refresh: ctx.store.should_refresh(&platform.id).await,
        });
    }

    if opts.format == OutputFormat::Json {
        let json = serde_json::json!({
            "config_path": config_path.display().to_string(),
            "platforms": platforms,
        });
        println!("{}", format_json(&json)?);
        return Ok(());
    }

    println!("{}\n", "ctiscan Status".bold());
    println!("Config file: {}", config_path.display().to_string().cyan());
    println!();

    if platforms.is_empty() {
        println!("{} No platforms configured", "✗".red());
        println!("  → Run 'ctiscan init' to add one");
        println!();
        return Ok(());
    }

    let now = Utc::now();
    for (platform, status) in ctx.config.platforms.iter().zip(&platforms) {
        let marker = match status.last_refresh_succeeded {
            Some(true) if !status.due_for_refresh => "✓".green(),
            Some(true) => "⚠".yellow(),
            Some(false) => "✗".red(),
            None => "○".dimmed(),
        };
        println!(
            "{} {} {} {}",
            marker,
            status.name.bold(),
            format!("[{}]", status.family).dimmed(),
            status.url.dimmed()
        );

        let meta = metas.iter().find(|m| m.platform_id == platform.id);
        match meta {
            Some(meta) => println!(
                "  {} entities, refreshed {}{}",
                meta.entity_count,
                format_age(meta.refreshed_at, now),
                if meta.succeeded { "" } else { " (last refresh failed)" }
            ),
            None => println!("  not cached yet → run 'ctiscan refresh'"),
        }

        if !status.token_configured {
            println!("  {} no API token configured", "⚠".yellow());
        }
    }
    println!();

    Ok(())
}

fn not_configured(format: OutputFormat, config_path: &str) -> Result<()> {
    if format == OutputFormat::Json {
        let json = serde_json::json!({
            "config_path": config_path,
            "configured": false,
        });
        println!("{}", format_json(&json)?);
        return Ok(());
    }

    println!("{} Configuration not found", "✗".red());
    println!();
    println!(
        "Run {} to create a configuration file.",
        "ctiscan init".cyan()
    );
    println!();
    Ok(())
}
