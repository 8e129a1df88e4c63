//! Init command implementation

use colored::Colorize;
use dialoguer::{Confirm, Input, Password, Select, theme::ColorfulTheme};

use crate::cli::args::GlobalOptions;
use crate::config::{Config, PlatformConfig};
use crate::error::Result;
use crate::models::PlatformFamily;
use crate::source::rate_limit::DEFAULT_REQUESTS_PER_SECOND;

/// Run the init command: add (or replace) one platform in the config file
pub async fn run(opts: &GlobalOptions) -> Result<()> {
    let theme = ColorfulTheme::default();
    let mut config = Config::load_at(opts.config_ref()).unwrap_or_default();

    println!("{}", "Welcome to ctiscan!".bold().green());
    if config.platforms.is_empty() {
        println!("Let's connect your first platform.\n");
    } else {
        println!(
            "{} platform(s) already configured. Adding another.\n",
            config.platforms.len()
        );
    }

    let families = ["CTI platform (GraphQL)", "Simulation platform (REST)"];
    let family = match Select::with_theme(&theme)
        .with_prompt("Platform type")
        .items(&families)
        .default(0)
        .interact()?
    {
        0 => PlatformFamily::Cti,
        _ => PlatformFamily::Simulation,
    };

    let url: String = Input::with_theme(&theme)
        .with_prompt("Base URL")
        .validate_with(|input: &String| -> std::result::Result<(), &str> {
            if input.starts_with("http://") || input.starts_with("https://") {
                Ok(())
            } else {
                Err("URL must start with http:// or https://")
            }
        })
        .interact_text()?;

    let id: String = Input::with_theme(&theme)
        .with_prompt("Platform id")
        .default(format!("{}-{}", family, config.platforms.len() + 1))
        .interact_text()?;

    if config.platform(&id).is_some() {
        let replace = Confirm::with_theme(&theme)
            .with_prompt(format!("Platform '{}' exists. Replace it?", id))
            .default(false)
            .interact()?;
        if !replace {
            println!("{}", "Nothing changed.".dimmed());
            return Ok(());
        }
    }

    let name: String = Input::with_theme(&theme)
        .with_prompt("Display name")
        .allow_empty(true)
        .interact_text()?;

    let token: String = Password::with_theme(&theme)
        .with_prompt("API token (leave empty for none)")
        .allow_empty_password(true)
        .interact()?;

    config.upsert_platform(PlatformConfig {
        id: id.clone(),
        name: (!name.trim().is_empty()).then(|| name.trim().to_string()),
        family,
        url: url.trim_end_matches('/').to_string(),
        token: (!token.is_empty()).then_some(token),
        requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
    });
    config.validate()?;
    config.save_at(opts.config_ref())?;

    let config_path = Config::resolve_path(opts.config_ref())?;
    println!(
        "\n{} Configuration saved to: {}",
        "✓".green(),
        config_path.display()
    );
    println!("  Platform: {} ({})", id.bold(), family);

    println!("\n{}", "You're all set! Try running:".bold());
    println!("  {} - Fetch entities now", "ctiscan refresh".cyan());
    println!("  {} - Find entities in a report", "ctiscan scan report.txt".cyan());

    Ok(())
}
