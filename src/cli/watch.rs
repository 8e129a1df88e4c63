//! Watch command implementation

use colored::Colorize;

use crate::cli::CommandContext;
use crate::cli::args::GlobalOptions;
use crate::error::Result;

/// Run both family schedulers in the foreground until Ctrl-C
pub async fn run(opts: &GlobalOptions) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    ctx.require_platforms()?;
    let service = ctx.refresh_service()?;

    let intervals = ctx.config.refresh_intervals();
    println!(
        "{} Watching {} platforms (every {}m when healthy, {}m after failures). Press Ctrl-C to stop.",
        "→".cyan(),
        ctx.config.platforms.len(),
        intervals.long.as_secs() / 60,
        intervals.short.as_secs() / 60
    );

    service.start().await;
    for state in service.refresh_status().families {
        let health = if state.all_caches_healthy {
            "healthy".green()
        } else {
            "unhealthy".yellow()
        };
        println!("  {}: {}", state.family, health);
    }

    tokio::signal::ctrl_c().await?;

    service.stop();
    println!("\n{}", "Stopped.".dimmed());
    Ok(())
}
