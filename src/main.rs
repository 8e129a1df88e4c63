//! ctiscan CLI - find known threat-intelligence entities in text

use clap::Parser;
use log::LevelFilter;

use ctiscan::cli::args::GlobalOptions;
use ctiscan::cli::{self, CacheCommands, Cli, Commands};
use ctiscan::error::Result;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}

fn init_logging(debug: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if debug {
        builder.filter_level(LevelFilter::Debug);
    }
    builder.format_timestamp_secs().init();
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let opts = GlobalOptions::from_cli(&cli);

    match cli.command {
        Commands::Init => cli::init::run(&opts).await,
        Commands::Status => cli::status::run(&opts).await,
        Commands::Refresh { force, family } => cli::refresh::run(&opts, force, family).await,
        Commands::Scan(args) => cli::scan::run(&opts, args).await,
        Commands::Watch => cli::watch::run(&opts).await,
        Commands::Cache(cache_cmd) => match cache_cmd {
            CacheCommands::Status => cli::cache::status(&opts),
            CacheCommands::Clear { platform } => cli::cache::clear(&opts, platform.as_deref()).await,
            CacheCommands::Path => cli::cache::path(&opts),
        },
        Commands::Completion { shell } => {
            cli::completions::generate(shell);
            Ok(())
        }
    }
}
