//! Merge command - reduce per-tile manifests into a global index.

use std::path::PathBuf;

use clap::Args;
use crossview::manifest::{aggregate_root, write_index, AggregateOptions};

use super::common::CliContext;
use crate::error::CliError;

/// Arguments for the merge command.
#[derive(Debug, Args)]
pub struct MergeArgs {
    /// Directory holding <tile>/manifest.json (default: processed root)
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Index output path (default: <root>/index.json)
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Omit the per-tile entries from the index
    #[arg(long)]
    pub skip_tiles: bool,
}

/// Run the merge command.
pub fn run(ctx: &CliContext, args: MergeArgs) -> Result<(), CliError> {
    let root = args
        .root
        .unwrap_or_else(|| ctx.layout.processed_root.clone());
    let out = args.out.unwrap_or_else(|| root.join("index.json"));

    let options = AggregateOptions {
        include_tiles: !args.skip_tiles,
    };
    let index = aggregate_root(&root, options)?;
    write_index(&out, &index)?;

    let summary = &index.summary;
    println!("Merged {} tiles -> {}", summary.tiles, out.display());
    println!(
        "  Records: {} raw, {} clean",
        count(summary.counts.raw),
        count(summary.counts.clean)
    );
    println!(
        "  Images:  {} ({} clean)",
        count(summary.counts.images),
        count(summary.counts.images_clean)
    );
    Ok(())
}

fn count(value: Option<u64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}
