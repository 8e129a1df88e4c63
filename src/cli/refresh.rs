//! Refresh command implementation

use std::time::Duration;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use crate::cli::args::GlobalOptions;
use crate::cli::{CommandContext, OutputFormat};
use crate::error::Result;
use crate::models::PlatformFamily;
use crate::models::display::SnapshotDisplay;
use crate::output::{format_json, format_table};

/// Run one refresh pass per family and report the resulting snapshots
pub async fn run(opts: &GlobalOptions, force: bool, family: Option<PlatformFamily>) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    ctx.require_platforms()?;
    let service = ctx.refresh_service()?;

    let spinner = (ctx.format != OutputFormat::Json).then(|| {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(spinner_style());
        spinner.set_message(match family {
            Some(family) => format!("Refreshing {} platforms...", family),
            None => "Refreshing platforms...".to_string(),
        });
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner
    });

    let healthy = service.refresh_all(force, family).await;

    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    let rows: Vec<SnapshotDisplay> = ctx
        .store
        .list_meta()?
        .iter()
        .filter(|meta| ctx.config.platform(&meta.platform_id).is_some())
        .map(SnapshotDisplay::from)
        .collect();

    match ctx.format {
        OutputFormat::Json => {
            let report = serde_json::json!({
                "healthy": healthy,
                "status": service.refresh_status(),
                "snapshots": rows,
            });
            println!("{}", format_json(&report)?);
        }
        _ => {
            println!("{}", format_table(&rows, "No snapshots cached."));
            if healthy {
                println!("{} All caches healthy", "✓".green());
            } else {
                println!(
                    "{} Some platforms failed to refresh (run with --debug for details)",
                    "⚠".yellow()
                );
            }
        }
    }

    Ok(())
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}
