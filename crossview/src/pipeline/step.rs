//! Pipeline steps and their idempotency keys.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use super::{DataLayout, PipelineError};
use crate::coord::TileId;

/// One per-tile step, in canonical execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Step {
    /// Resolve the tile region and write the tile descriptor.
    Resolve,
    /// Fetch records and images.
    Acquire,
    /// Project records into the tile CRS.
    Derive,
    /// Classify records against reference footprints.
    Filter,
    /// Write the clean subset and link its images.
    Clean,
    /// Build the tile manifest.
    Manifest,
}

impl Step {
    /// Every step in order.
    pub const ALL: [Step; 6] = [
        Step::Resolve,
        Step::Acquire,
        Step::Derive,
        Step::Filter,
        Step::Clean,
        Step::Manifest,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Step::Resolve => "resolve",
            Step::Acquire => "acquire",
            Step::Derive => "derive",
            Step::Filter => "filter",
            Step::Clean => "clean",
            Step::Manifest => "manifest",
        }
    }

    /// Declared output artifact; its existence means the step is done.
    pub fn output(&self, layout: &DataLayout, tile: &TileId) -> PathBuf {
        match self {
            Step::Resolve => layout.tile_descriptor(tile),
            Step::Acquire => layout.acquire_marker(tile),
            Step::Derive => layout.meta_projected(tile),
            Step::Filter => layout.meta_annotated(tile),
            Step::Clean => layout.meta_clean(tile),
            Step::Manifest => layout.manifest(tile),
        }
    }

    /// Artifact that must exist before the step can run.
    ///
    /// Derive reads `meta.jsonl` directly, so records from a partial
    /// acquisition are still processed while acquisition stays pending.
    pub fn input(&self, layout: &DataLayout, tile: &TileId) -> Option<PathBuf> {
        match self {
            Step::Resolve | Step::Manifest => None,
            Step::Acquire => Some(Step::Resolve.output(layout, tile)),
            Step::Derive => Some(layout.meta(tile)),
            Step::Filter => Some(Step::Derive.output(layout, tile)),
            Step::Clean => Some(Step::Filter.output(layout, tile)),
        }
    }

    /// Parses a comma-separated selection into canonical order.
    ///
    /// Duplicates collapse; order in the input is irrelevant.
    pub fn parse_list(s: &str) -> Result<Vec<Step>, PipelineError> {
        let mut steps = s
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(Step::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        steps.sort();
        steps.dedup();
        Ok(steps)
    }
}

impl FromStr for Step {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "resolve" | "tile" => Ok(Step::Resolve),
            "acquire" | "fetch" | "mapillary" => Ok(Step::Acquire),
            "derive" | "augment" => Ok(Step::Derive),
            "filter" | "annotate" => Ok(Step::Filter),
            "clean" => Ok(Step::Clean),
            "manifest" => Ok(Step::Manifest),
            other => Err(PipelineError::UnknownStep(other.to_string())),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
