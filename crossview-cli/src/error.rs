//! CLI error type and exit codes.

use std::fmt;

use crossview::config::ConfigError;
use crossview::manifest::AggregateError;
use crossview::pipeline::PipelineError;
use crossview::tiles::TileIndexError;

/// Exit code for a run where a tile or fetch failed.
pub const EXIT_FAILURE: i32 = 1;

/// Exit code for configuration errors and missing inputs.
pub const EXIT_CONFIG: i32 = 2;

/// Exit code after Ctrl-C.
pub const EXIT_INTERRUPTED: i32 = 130;

/// Errors surfaced by CLI commands.
#[derive(Debug)]
pub enum CliError {
    /// Bad configuration, flags or credentials.
    Config(String),
    /// A required input file or artifact is absent.
    MissingInput(String),
    /// Tile index could not be loaded or queried.
    TileIndex(String),
    /// Manifest aggregation failed.
    Merge(String),
    /// One or more tiles failed.
    TilesFailed { failed: usize, total: usize },
    /// Unrecoverable failure of a single operation.
    Failed(String),
    /// The run was interrupted by the user.
    Interrupted,
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) | CliError::MissingInput(_) | CliError::TileIndex(_) => {
                EXIT_CONFIG
            }
            CliError::Merge(_) | CliError::TilesFailed { .. } | CliError::Failed(_) => {
                EXIT_FAILURE
            }
            CliError::Interrupted => EXIT_INTERRUPTED,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::MissingInput(msg) => write!(f, "Missing input: {}", msg),
            CliError::TileIndex(msg) => write!(f, "Tile index error: {}", msg),
            CliError::Merge(msg) => write!(f, "Merge failed: {}", msg),
            CliError::TilesFailed { failed, total } => {
                write!(f, "{} of {} tiles failed", failed, total)
            }
            CliError::Failed(msg) => write!(f, "{}", msg),
            CliError::Interrupted => write!(f, "Interrupted"),
        }
    }
}

impl std::error::Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<TileIndexError> for CliError {
    fn from(e: TileIndexError) -> Self {
        match e {
            TileIndexError::NotFound(_) => CliError::Failed(e.to_string()),
            TileIndexError::Io { .. } => CliError::MissingInput(e.to_string()),
            other => CliError::TileIndex(other.to_string()),
        }
    }
}

impl From<AggregateError> for CliError {
    fn from(e: AggregateError) -> Self {
        match e {
            AggregateError::RootNotFound(_) => CliError::MissingInput(e.to_string()),
            AggregateError::NoManifests(_) => CliError::Config(e.to_string()),
            other => CliError::Merge(other.to_string()),
        }
    }
}

impl From<PipelineError> for CliError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::NoTiles | PipelineError::UnknownStep(_) => {
                CliError::Config(e.to_string())
            }
            PipelineError::MissingInput { .. } => CliError::MissingInput(e.to_string()),
            PipelineError::Cancelled => CliError::Interrupted,
            other => CliError::Failed(other.to_string()),
        }
    }
}
