//! Pipeline orchestration
//!
//! Runs a fixed sequence of steps over a list of tiles:
//!
//! ```text
//! Resolve ─► Acquire ─► Derive ─► Filter ─► Clean ─► Manifest
//! tile.json  acquire.done  meta_projected  meta_annotated  meta_clean  manifest.json
//! ```
//!
//! Acquisition writes `meta.jsonl` as it goes; `acquire.done` only appears
//! once nothing is left to fetch.
//!
//! Each step declares one output artifact. A step whose output already
//! exists is skipped unless forced, which makes reruns resume where the
//! previous run stopped. Existence is checked through an [`ArtifactStore`]
//! rather than by probing paths at each call site.
//!
//! A failing step stops the remaining steps of its tile only; the batch
//! moves on to the next tile.
//!
//! # Example
//!
//! ```ignore
//! use crossview::pipeline::{FsArtifactStore, PipelineConfig, PipelineOrchestrator, Step};
//!
//! let config = PipelineConfig::default().with_steps(Step::parse_list("derive,manifest")?);
//! let orchestrator = PipelineOrchestrator::new(executor, FsArtifactStore, layout, config);
//! let report = orchestrator.run(&tiles).await?;
//! ```

mod artifact;
mod descriptor;
mod executor;
mod layout;
mod orchestrator;
mod step;

pub use artifact::{ArtifactStore, FsArtifactStore, MemoryArtifactStore};
pub use descriptor::TileDescriptor;
pub use executor::{StepExecutor, StepFuture, TileStepExecutor};
pub use layout::{DataLayout, DEFAULT_DATA_ROOT};
pub use orchestrator::{
    PipelineConfig, PipelineOrchestrator, RunReport, StepStatus, TileReport,
    DEFAULT_STEP_DELAY_MS,
};
pub use step::Step;

use std::path::PathBuf;

use thiserror::Error;

use crate::acquisition::AcquisitionError;
use crate::coord::TileId;
use crate::derive::DeriveError;
use crate::filter::FilterError;
use crate::manifest::ManifestError;
use crate::store::StoreError;
use crate::tiles::TileIndexError;

/// Errors from the orchestrator and its steps.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no tiles to process")]
    NoTiles,

    #[error("unknown step '{0}'")]
    UnknownStep(String),

    /// A prerequisite artifact is absent.
    #[error("missing input for step {step}: {path}")]
    MissingInput { step: Step, path: PathBuf },

    #[error("every cell failed for tile {tile} ({failed_cells} cells)")]
    AcquisitionFailed { tile: TileId, failed_cells: usize },

    #[error("invalid tile descriptor {path}: {message}")]
    Descriptor { path: PathBuf, message: String },

    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    TileIndex(#[from] TileIndexError),

    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error(transparent)]
    Derive(#[from] DeriveError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PipelineError {
    /// Whether the failure is the credential being rejected.
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            PipelineError::Acquisition(AcquisitionError::Unauthorized { .. })
        )
    }
}
