//! Crossview CLI - Command-line interface
//!
//! Tile selection, lookup, per-tile acquisition, the multi-step pipeline
//! and manifest merging on top of the `crossview` library.

mod commands;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use crossview::logging::{init_logging, LogConfig};
use tracing::{debug, error};

use commands::common::CliContext;
use commands::fetch::FetchCommandArgs;
use commands::lookup::LookupArgs;
use commands::merge::MergeArgs;
use commands::run::RunArgs;
use commands::select::SelectArgs;
use error::CliError;

#[derive(Parser)]
#[command(name = "crossview")]
#[command(about = "Tile-based street-level imagery acquisition and filtering", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.crossview/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data root holding mesh/, imagery/ and processed/
    #[arg(long, global = true)]
    data_root: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Select a set of tiles and write them as a tile list
    Select(SelectArgs),

    /// Show the tile for an id or a WGS84 point
    Lookup(LookupArgs),

    /// Fetch imagery records for one tile
    Fetch(FetchCommandArgs),

    /// Run the pipeline over a tile list
    Run(RunArgs),

    /// Merge per-tile manifests into a global index
    Merge(MergeArgs),
}

fn main() {
    let cli = Cli::parse();

    let mut log_config = LogConfig::default().with_verbose(cli.verbose);
    if let Some(path) = &cli.log_file {
        log_config = log_config.with_log_file(path);
    }
    // Keep the guard alive so buffered file logs are flushed on exit
    let _guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(error::EXIT_CONFIG);
        }
    };

    let code = match execute(cli) {
        Ok(()) => 0,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    };
    debug!(code, "Exiting");
    drop(_guard);
    std::process::exit(code);
}

fn execute(cli: Cli) -> Result<(), CliError> {
    let ctx = CliContext::load(cli.config.as_deref(), cli.data_root.as_deref())?;

    match cli.command {
        Commands::Select(args) => commands::select::run(&ctx, args),
        Commands::Lookup(args) => commands::lookup::run(&ctx, args),
        Commands::Merge(args) => commands::merge::run(&ctx, args),
        Commands::Fetch(args) => runtime()?.block_on(commands::fetch::run(&ctx, args)),
        Commands::Run(args) => {
            let show_progress = !cli.verbose;
            runtime()?.block_on(commands::run::run(&ctx, args, show_progress))
        }
    }
}

fn runtime() -> Result<tokio::runtime::Runtime, CliError> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::Config(format!("failed to start async runtime: {}", e)))
}
