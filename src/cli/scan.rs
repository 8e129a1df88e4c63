//! Scan command implementation

use std::io::Read;
use std::path::Path;

use colored::Colorize;

use crate::cli::args::GlobalOptions;
use crate::cli::{CommandContext, OutputFormat, ScanArgs};
use crate::config::Config;
use crate::error::Result;
use crate::matcher::{CategoryFilter, MatchRecord, ScanOptions, scan_with};
use crate::models::CachedEntityIndex;
use crate::models::display::MatchDisplay;
use crate::output::{format_json, format_table};

/// Run the scan command against the cached snapshots
pub async fn run(opts: &GlobalOptions, args: ScanArgs) -> Result<()> {
    let ctx = CommandContext::new(opts)?;

    let snapshots = ctx.configured_snapshots().await?;
    if snapshots.is_empty() {
        log::warn!("No cached snapshots; run `ctiscan refresh` first");
    }

    let index = CachedEntityIndex::from_snapshots(&snapshots);
    log::debug!(
        "Scanning with {} keys from {} snapshots",
        index.len(),
        snapshots.len()
    );

    let text = read_input(args.file.as_deref())?;
    let filter = filter_for(&ctx.config, &args);
    let options = options_for(&ctx.config, &args);

    let records = scan_with(&text, &index, &options, |t| filter.allows(t));
    print_matches(&records, ctx.format)
}

/// Config defaults overridden by command-line type filters
fn filter_for(config: &Config, args: &ScanArgs) -> CategoryFilter {
    let mut filter = config.category_filter();
    if !args.include_types.is_empty() {
        filter.include = Some(args.include_types.iter().copied().collect());
    }
    filter.exclude.extend(args.exclude_types.iter().copied());
    filter
}

fn options_for(config: &Config, args: &ScanArgs) -> ScanOptions {
    let mut options = config.scan_options();
    if let Some(min_length) = args.min_length {
        options.min_key_chars = min_length;
    }
    options
}

fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) if path != Path::new("-") => Ok(std::fs::read_to_string(path)?),
        _ => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text)?;
            Ok(text)
        }
    }
}

fn print_matches(records: &[MatchRecord], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", format_json(records)?),
        OutputFormat::Table => {
            let rows: Vec<MatchDisplay> = records.iter().map(MatchDisplay::from).collect();
            println!("{}", format_table(&rows, "No matches found."));
        }
        OutputFormat::Pretty => {
            if records.is_empty() {
                println!("{}", "No matches found.".dimmed());
                return Ok(());
            }

            for record in records {
                let alias = if record.matched_text.eq_ignore_ascii_case(&record.name) {
                    String::new()
                } else {
                    format!(" as \"{}\"", record.matched_text)
                };
                println!(
                    "{} {}{} {}",
                    format!("[{}]", record.entity_type).cyan(),
                    record.name.bold(),
                    alias,
                    format!(
                        "({} @ {}..{})",
                        record.platform_id, record.start_index, record.end_index
                    )
                    .dimmed()
                );
            }
            println!(
                "\n{} {}",
                records.len(),
                if records.len() == 1 { "match" } else { "matches" }
            );
        }
    }

    Ok(())
}
