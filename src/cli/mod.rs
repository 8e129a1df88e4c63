//! CLI command definitions and handlers

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
pub use clap_complete::Shell;

use crate::models::{EntityType, PlatformFamily};

pub mod args;
pub mod cache;
pub mod completions;
pub mod context;
pub mod init;
pub mod refresh;
pub mod scan;
pub mod status;
pub mod watch;

pub use args::OutputFormat;
pub use context::CommandContext;

/// ctiscan - find known threat-intelligence entities in text
#[derive(Parser, Debug)]
#[command(name = "ctiscan")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (pretty, table, json)
    #[arg(
        long,
        global = true,
        env = "CTISCAN_FORMAT",
        default_value = "pretty",
        hide_env = true,
        hide_possible_values = true
    )]
    pub format: OutputFormat,

    /// Override config file location
    #[arg(long, global = true, env = "CTISCAN_CONFIG", hide_env = true)]
    pub config: Option<String>,

    /// Enable debug logging
    #[arg(long, global = true, env = "CTISCAN_DEBUG", hide_env = true)]
    pub debug: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Add or update a platform interactively
    Init,

    /// Show configured platforms and the state of their caches
    Status,

    /// Refresh platform caches now
    Refresh {
        /// Refresh every platform, even those with a fresh cache
        #[arg(long, short = 'f')]
        force: bool,

        /// Only refresh one platform family
        #[arg(long, value_enum)]
        family: Option<PlatformFamily>,
    },

    /// Scan text for known entities
    #[command(after_help = "EXAMPLES:\n  \
        ctiscan scan report.txt\n  \
        cat advisory.md | ctiscan scan --format json\n  \
        ctiscan scan notes.txt --exclude-type attack-pattern")]
    Scan(ScanArgs),

    /// Keep caches fresh in the foreground until interrupted
    Watch,

    /// Manage the local snapshot cache
    #[command(subcommand)]
    Cache(CacheCommands),

    /// Generate shell completions
    #[command(after_help = "\
Examples:
  bash:   ctiscan completion bash > /etc/bash_completion.d/ctiscan
  zsh:    ctiscan completion zsh > \"${fpath[1]}/_ctiscan\"
  fish:   ctiscan completion fish > ~/.config/fish/completions/ctiscan.fish")]
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Arguments for `ctiscan scan`
#[derive(Debug, Clone, Args, Default)]
pub struct ScanArgs {
    /// File to scan (reads stdin when omitted or "-")
    pub file: Option<PathBuf>,

    /// Only report these entity types (repeatable)
    #[arg(long = "include-type", short = 'i', value_parser = parse_entity_type)]
    pub include_types: Vec<EntityType>,

    /// Never report these entity types (repeatable)
    #[arg(long = "exclude-type", short = 'x', value_parser = parse_entity_type)]
    pub exclude_types: Vec<EntityType>,

    /// Ignore names and aliases shorter than this many characters
    #[arg(long)]
    pub min_length: Option<usize>,
}

fn parse_entity_type(s: &str) -> Result<EntityType, String> {
    s.parse()
}

/// Cache management subcommands
#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Show snapshot statistics
    Status,

    /// Delete cached snapshots
    Clear {
        /// Only clear this platform's snapshot
        #[arg(long)]
        platform: Option<String>,
    },

    /// Print the cache directory
    Path,
}
