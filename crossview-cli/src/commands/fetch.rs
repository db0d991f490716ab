//! Fetch command - resolve and acquire records for a single tile.

use clap::Args;
use crossview::pipeline::{
    FsArtifactStore, PipelineConfig, PipelineOrchestrator, Step, StepStatus, TileStepExecutor,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::common::{build_engine, install_interrupt_handler, CliContext, FetchArgs};
use super::select::parse_tile_id;
use crate::error::CliError;

/// Arguments for the fetch command.
#[derive(Debug, Args)]
pub struct FetchCommandArgs {
    /// Tile id (10/430/720 or 10-430-720)
    #[arg(long)]
    pub tile_id: String,

    #[command(flatten)]
    pub fetch: FetchArgs,
}

/// Run the fetch command.
///
/// The tile descriptor is always rewritten so that flag changes such as
/// `--margin-m` take effect; records already in `meta.jsonl` are skipped.
pub async fn run(ctx: &CliContext, args: FetchCommandArgs) -> Result<(), CliError> {
    let tile = parse_tile_id(&args.tile_id)?;
    let token = ctx.config.resolve_token(args.fetch.token.as_deref())?;
    let fetch = args.fetch.resolve(&ctx.config);
    let filter = ctx.config.filter_config();
    let index = ctx.tile_index()?;

    let cancel = CancellationToken::new();
    install_interrupt_handler(cancel.clone())?;

    let engine = build_engine(&token, &ctx.config, fetch, cancel.clone())?;
    let executor = TileStepExecutor::new(ctx.layout.clone(), index, engine, filter);
    let config = PipelineConfig::default()
        .with_steps(vec![Step::Resolve, Step::Acquire])
        .with_force(true)
        .with_step_delay(std::time::Duration::ZERO);
    let orchestrator =
        PipelineOrchestrator::new(executor, FsArtifactStore, ctx.layout.clone(), config)
            .with_cancellation(cancel);

    let report = orchestrator.run(&[tile]).await?;
    if report.cancelled {
        return Err(CliError::Interrupted);
    }

    let Some(tile_report) = report.tiles.first() else {
        return Err(CliError::Failed("no tile report".to_string()));
    };
    if let Some(error) = &tile_report.error {
        return Err(CliError::Failed(format!("{}: {}", tile, error)));
    }
    if tile_report.status(Step::Acquire) != Some(&StepStatus::Executed) {
        return Err(CliError::Failed(format!("{}: acquisition did not run", tile)));
    }

    let meta = ctx.layout.meta(&tile);
    if !ctx.layout.acquire_marker(&tile).exists() {
        warn!(tile = %tile, path = %meta.display(), "Fetch incomplete; rerun to resume");
        println!("Records for {} -> {} (incomplete, rerun to resume)", tile, meta.display());
        return Ok(());
    }
    info!(tile = %tile, path = %meta.display(), "Fetch complete");
    println!("Records for {} -> {}", tile, meta.display());
    Ok(())
}
