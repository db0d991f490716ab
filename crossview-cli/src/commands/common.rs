//! Common types and utilities shared across CLI commands.

use std::path::Path;
use std::time::Duration;

use clap::Args;
use crossview::acquisition::{AcquisitionEngine, FetchConfig, RetryPolicy};
use crossview::config::ConfigFile;
use crossview::filter::FilterConfig;
use crossview::pipeline::DataLayout;
use crossview::provider::ReqwestClient;
use crossview::tiles::TileIndex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::CliError;

/// Settings shared by every command, resolved once from global flags and
/// the config file.
pub struct CliContext {
    pub config: ConfigFile,
    pub layout: DataLayout,
}

impl CliContext {
    /// Loads the config file (explicit path or default location).
    ///
    /// An explicit path that does not exist is an error; the default
    /// location may be absent.
    pub fn load(config_path: Option<&Path>, data_root: Option<&Path>) -> Result<Self, CliError> {
        let config = match config_path {
            Some(path) => {
                if !path.exists() {
                    return Err(CliError::Config(format!(
                        "config file not found: {}",
                        path.display()
                    )));
                }
                ConfigFile::load_from(path)?
            }
            None => ConfigFile::load()?,
        };
        let layout = config.layout(data_root);
        Ok(Self { config, layout })
    }

    /// Loads the tile index named by the layout.
    pub fn tile_index(&self) -> Result<TileIndex, CliError> {
        let path = &self.layout.tile_index;
        if !path.exists() {
            return Err(CliError::MissingInput(format!(
                "tile index not found: {}",
                path.display()
            )));
        }
        let index = TileIndex::load(path)?;
        info!(path = %path.display(), tiles = index.len(), crs = index.crs(), "Loaded tile index");
        Ok(index)
    }
}

/// Acquisition flags shared by `fetch` and `run`.
///
/// Every flag is optional; unset flags fall back to the config file.
#[derive(Debug, Clone, Default, Args)]
pub struct FetchArgs {
    /// Stop after this many records per tile (0 = unlimited)
    #[arg(long)]
    pub max_records: Option<usize>,

    /// Margin added around the tile region in meters
    #[arg(long)]
    pub margin_m: Option<f64>,

    /// Split the query box into an N x N grid
    #[arg(long)]
    pub subdivide: Option<u32>,

    /// Retries per request after the first attempt
    #[arg(long)]
    pub retries: Option<u32>,

    /// Delay between requests in milliseconds
    #[arg(long)]
    pub sleep_ms: Option<u64>,

    /// Records per page
    #[arg(long)]
    pub page_size: Option<u32>,

    /// Keep only records whose camera type contains this text
    #[arg(long)]
    pub device_filter: Option<String>,

    /// Skip thumbnail downloads
    #[arg(long)]
    pub no_thumbs: bool,

    /// Thumbnail size to download
    #[arg(long)]
    pub thumb_size: Option<u32>,

    /// Also download a larger image per record
    #[arg(long)]
    pub download_full: bool,

    /// Size of the larger image
    #[arg(long)]
    pub full_size: Option<u32>,

    /// Access token (overrides MAPILLARY_ACCESS_TOKEN and the config file)
    #[arg(long)]
    pub token: Option<String>,
}

impl FetchArgs {
    /// Resolves the fetch settings: CLI takes precedence, then config.
    pub fn resolve(&self, config: &ConfigFile) -> FetchConfig {
        let base = config.fetch_config();
        let mut assets = base.assets.clone();
        if self.no_thumbs {
            assets.thumbs = false;
        }
        if self.download_full {
            assets.full = true;
        }
        if let Some(size) = self.thumb_size {
            assets.thumb_size = size;
        }
        if let Some(size) = self.full_size {
            assets.full_size = size;
        }

        let retry = match self.retries {
            Some(n) => RetryPolicy::exponential(n),
            None => base.retry.clone(),
        };
        let delay = self
            .sleep_ms
            .map(Duration::from_millis)
            .unwrap_or(base.politeness_delay);
        let device_filter = self
            .device_filter
            .clone()
            .or_else(|| base.device_filter.clone());

        FetchConfig {
            margin_m: self.margin_m.unwrap_or(base.margin_m),
            subdivide: self.subdivide.unwrap_or(base.subdivide),
            page_size: self.page_size.unwrap_or(base.page_size),
            max_records: self.max_records.unwrap_or(base.max_records),
            ..base
        }
        .with_retry(retry)
        .with_politeness_delay(delay)
        .with_device_filter(device_filter)
        .with_assets(assets)
    }
}

/// Filter flags shared by `run`.
#[derive(Debug, Clone, Default, Args)]
pub struct FilterArgs {
    /// Distance to the nearest footprint under which a record is clean
    #[arg(long)]
    pub distance_threshold_m: Option<f64>,

    /// Footprint layers to try, in priority order (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub layers: Vec<String>,
}

impl FilterArgs {
    pub fn resolve(&self, config: &ConfigFile) -> FilterConfig {
        let mut filter = config.filter_config();
        if let Some(threshold) = self.distance_threshold_m {
            filter = filter.with_threshold(threshold);
        }
        if !self.layers.is_empty() {
            filter = filter.with_layers(self.layers.clone());
        }
        filter
    }
}

/// Builds an acquisition engine with an authenticated API client and an
/// anonymous asset client.
pub fn build_engine(
    token: &str,
    config: &ConfigFile,
    fetch: FetchConfig,
    cancel: CancellationToken,
) -> Result<AcquisitionEngine<ReqwestClient>, CliError> {
    let timeout = config.api.timeout_secs;
    let api = ReqwestClient::with_token(token, timeout)
        .map_err(|e| CliError::Config(format!("failed to create API client: {}", e)))?;
    let assets = ReqwestClient::with_timeout(timeout)
        .map_err(|e| CliError::Config(format!("failed to create download client: {}", e)))?;
    Ok(AcquisitionEngine::new(api, assets, fetch).with_cancellation(cancel))
}

/// Cancels `token` on Ctrl-C. A second Ctrl-C exits immediately.
pub fn install_interrupt_handler(token: CancellationToken) -> Result<(), CliError> {
    ctrlc::set_handler(move || {
        if token.is_cancelled() {
            std::process::exit(crate::error::EXIT_INTERRUPTED);
        }
        warn!("Interrupt received, stopping after the current request");
        token.cancel();
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))
}
