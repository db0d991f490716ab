//! Run command - drive the per-tile pipeline over a tile list.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use crossview::acquisition::AcquisitionEngine;
use crossview::coord::TileId;
use crossview::pipeline::{
    ArtifactStore, FsArtifactStore, PipelineOrchestrator, RunReport, Step, StepStatus,
    TileStepExecutor,
};
use crossview::provider::ReqwestClient;
use crossview::tiles::read_tile_list;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

use super::common::{build_engine, install_interrupt_handler, CliContext, FetchArgs, FilterArgs};
use crate::error::CliError;

/// Arguments for the run command.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Tile list CSV (tile_id_dash,tile_id_slash) or one id per line
    #[arg(long)]
    pub tiles: PathBuf,

    /// Steps to run, comma separated (default: all)
    #[arg(long)]
    pub steps: Option<String>,

    /// Show what would run without doing it
    #[arg(long)]
    pub dry_run: bool,

    /// Re-run steps whose output already exists
    #[arg(long)]
    pub overwrite: bool,

    /// Tiles processed concurrently
    #[arg(long)]
    pub parallel: Option<usize>,

    /// Delay after each executed step in milliseconds
    #[arg(long)]
    pub step_delay_ms: Option<u64>,

    #[command(flatten)]
    pub fetch: FetchArgs,

    #[command(flatten)]
    pub filter: FilterArgs,
}

/// Run the pipeline command.
pub async fn run(ctx: &CliContext, args: RunArgs, show_progress: bool) -> Result<(), CliError> {
    if !args.tiles.exists() {
        return Err(CliError::MissingInput(format!(
            "tile list not found: {}",
            args.tiles.display()
        )));
    }
    let tiles = read_tile_list(&args.tiles)?;
    let steps = match &args.steps {
        Some(list) => Step::parse_list(list)?,
        None => Step::ALL.to_vec(),
    };

    let mut config = ctx.config.pipeline_config();
    if let Some(n) = args.parallel {
        config = config.with_parallel_tiles(n);
    }
    if let Some(ms) = args.step_delay_ms {
        config = config.with_step_delay(Duration::from_millis(ms));
    }
    let config = config
        .with_steps(steps.clone())
        .with_force(args.overwrite)
        .with_dry_run(args.dry_run);

    let token = if needs_credential(&steps, &tiles, ctx, &args) {
        ctx.config.resolve_token(args.fetch.token.as_deref())?
    } else {
        String::new()
    };

    let cancel = CancellationToken::new();
    install_interrupt_handler(cancel.clone())?;

    let fetch = args.fetch.resolve(&ctx.config);
    let engine: AcquisitionEngine<ReqwestClient> =
        build_engine(&token, &ctx.config, fetch, cancel.clone())?;
    let index = ctx.tile_index()?;
    let executor =
        TileStepExecutor::new(ctx.layout.clone(), index, engine, args.filter.resolve(&ctx.config));
    let orchestrator =
        PipelineOrchestrator::new(executor, FsArtifactStore, ctx.layout.clone(), config)
            .with_cancellation(cancel);

    let spinner = show_progress.then(|| {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(format!("Processing {} tiles", tiles.len()));
        bar.enable_steady_tick(Duration::from_millis(120));
        bar
    });

    let result = orchestrator.run(&tiles).await;
    if let Some(bar) = spinner {
        bar.finish_and_clear();
    }
    let report = result?;

    print_report(&report, args.dry_run);

    if report.cancelled {
        return Err(CliError::Interrupted);
    }
    if !report.is_success() {
        return Err(CliError::TilesFailed {
            failed: report.failed_tiles(),
            total: report.tiles.len(),
        });
    }
    Ok(())
}

/// A token is only needed when some tile will actually run acquisition.
fn needs_credential(steps: &[Step], tiles: &[TileId], ctx: &CliContext, args: &RunArgs) -> bool {
    if args.dry_run || !steps.contains(&Step::Acquire) {
        return false;
    }
    args.overwrite
        || tiles
            .iter()
            .any(|t| !FsArtifactStore.exists(&Step::Acquire.output(&ctx.layout, t)))
}

fn status_label(status: &StepStatus) -> &'static str {
    match status {
        StepStatus::Skipped => "skip",
        StepStatus::Executed => "ok",
        StepStatus::Planned => "plan",
        StepStatus::Failed => "FAIL",
        StepStatus::NotReached => "-",
    }
}

fn print_report(report: &RunReport, dry_run: bool) {
    println!();
    if dry_run {
        println!("Dry run - nothing was executed");
    }
    for tile in &report.tiles {
        let steps: Vec<String> = tile
            .steps
            .iter()
            .map(|(step, status)| format!("{}={}", step, status_label(status)))
            .collect();
        println!("{:<14} {}", tile.tile.dash(), steps.join(" "));
        if let Some(error) = &tile.error {
            println!("{:<14} error: {}", "", error);
        }
    }
    println!();
    println!(
        "Tiles: {} total, {} failed{}",
        report.tiles.len(),
        report.failed_tiles(),
        if report.cancelled { " (interrupted)" } else { "" }
    );
}
