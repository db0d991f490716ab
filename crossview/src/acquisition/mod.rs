//! Acquisition engine
//!
//! Fetches every image record inside a tile's region exactly once, working
//! around the per-query result cap by subdividing the region into cells and
//! following cursor pagination inside each cell.
//!
//! # Flow
//!
//! ```text
//! region ──subdivide──► cell 0 ─┬─► page ─► page ─► … ─► Done
//!                       cell 1  │    │
//!                       …       │    └─► items ─► validate ─► device filter
//!                               │                  ─► dedup ─► assets ─► append
//!                               └─► RetryWait (transient) ─► Failed (exhausted)
//! ```
//!
//! Requests within a tile are strictly sequential. A politeness delay is
//! observed between pages and between cells, and every wait races the
//! cancellation token so an interrupt stops promptly.
//!
//! # Guarantees
//!
//! - A record is appended (and flushed) as soon as it is accepted, so an
//!   interrupted run keeps everything accepted so far and resumes from it.
//! - Items whose id is already stored are dropped before any download.
//! - A failed cell never fails the tile; only a rejected credential does.
//! - `max_records` stops all further work, mid-cell included.

mod assets;
mod cell;
mod retry;

pub use assets::{image_path, AssetConfig, AssetDirs};
pub use cell::{CellReport, CellState};
pub use retry::{
    RetryPolicy, DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_INITIAL_DELAY_MS, DEFAULT_JITTER_MS,
    DEFAULT_MAX_DELAY_SECS, DEFAULT_MAX_RETRIES,
};

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::coord::TileId;
use crate::geometry::Bounds;
use crate::provider::{
    ApiPage, AsyncHttpClient, FailureKind, ImageQuery, ProviderError, DEFAULT_BASE_URL,
    DEFAULT_PAGE_SIZE,
};
use crate::record::{Record, SOURCE_MAPILLARY};
use crate::store::{RecordStore, StoreError};

use assets::AssetFetcher;

/// Default total record cap per run.
pub const DEFAULT_MAX_RECORDS: usize = 1200;

/// Default margin around the tile region in metres.
pub const DEFAULT_MARGIN_M: f64 = 15.0;

/// Largest grid side; the region is never split into more than 64² cells.
pub const MAX_SUBDIVIDE: u32 = 64;

/// Default politeness delay between pages and cells.
pub const DEFAULT_POLITENESS_DELAY_MS: u64 = 350;

/// Errors that end a tile's acquisition.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    /// The credential was rejected; no cell can succeed.
    #[error("credential rejected while fetching tile {tile}: {source}")]
    Unauthorized {
        tile: TileId,
        #[source]
        source: ProviderError,
    },

    /// The record store could not be opened or written.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Acquisition settings.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchConfig {
    /// Listing endpoint.
    pub base_url: String,
    /// Source name written into every record.
    pub source: String,
    /// Margin added around the tile polygon, in metres.
    pub margin_m: f64,
    /// Grid size; the region becomes `subdivide`² cells. Clamped to
    /// `1..=MAX_SUBDIVIDE` by [`FetchConfig::with_subdivide`].
    pub subdivide: u32,
    /// Items requested per page.
    pub page_size: u32,
    /// Total accepted records per run; 0 means unlimited.
    pub max_records: usize,
    pub retry: RetryPolicy,
    /// Delay between pages and between cells.
    pub politeness_delay: Duration,
    /// Case-insensitive camera type substring records must contain.
    pub device_filter: Option<String>,
    pub assets: AssetConfig,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            source: SOURCE_MAPILLARY.to_string(),
            margin_m: DEFAULT_MARGIN_M,
            subdivide: 1,
            page_size: DEFAULT_PAGE_SIZE,
            max_records: DEFAULT_MAX_RECORDS,
            retry: RetryPolicy::default(),
            politeness_delay: Duration::from_millis(DEFAULT_POLITENESS_DELAY_MS),
            device_filter: None,
            assets: AssetConfig::default(),
        }
    }
}

impl FetchConfig {
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_margin(mut self, margin_m: f64) -> Self {
        self.margin_m = margin_m;
        self
    }

    pub fn with_subdivide(mut self, n: u32) -> Self {
        self.subdivide = n.clamp(1, MAX_SUBDIVIDE);
        self
    }

    pub fn with_page_size(mut self, size: u32) -> Self {
        self.page_size = size.max(1);
        self
    }

    pub fn with_max_records(mut self, max: usize) -> Self {
        self.max_records = max;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_politeness_delay(mut self, delay: Duration) -> Self {
        self.politeness_delay = delay;
        self
    }

    pub fn with_device_filter(mut self, filter: Option<String>) -> Self {
        self.device_filter = filter.filter(|f| !f.trim().is_empty());
        self
    }

    pub fn with_assets(mut self, assets: AssetConfig) -> Self {
        self.assets = assets;
        self
    }
}

/// Where a tile's acquisition output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionTarget {
    /// Append-only record store (`meta.jsonl`).
    pub meta_path: PathBuf,
    pub assets: AssetDirs,
}

/// Summary of one tile's acquisition run.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionReport {
    pub tile: TileId,
    /// One report per cell that was started.
    pub cells: Vec<CellReport>,
    /// Records appended in this run.
    pub accepted: usize,
    /// Size of the dedup set after the run.
    pub dedup_size: usize,
    /// The record cap stopped the run.
    pub cap_reached: bool,
    /// Cancellation stopped the run.
    pub cancelled: bool,
}

impl AcquisitionReport {
    pub fn failed_cells(&self) -> usize {
        self.cells.iter().filter(|c| c.is_failed()).count()
    }

    /// Nothing is left for a rerun to fetch: every cell finished, or the
    /// record cap was reached. A cancelled run is never complete.
    pub fn is_complete(&self) -> bool {
        !self.cancelled && (self.cap_reached || self.failed_cells() == 0)
    }
}

/// Sleeps unless cancelled first. Returns `false` on cancellation.
pub(crate) async fn sleep_or_cancel(cancel: &CancellationToken, delay: Duration) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    if delay.is_zero() {
        return true;
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

enum PageFetch {
    Body(Vec<u8>),
    Failed(ProviderError),
    Unauthorized(ProviderError),
    Cancelled,
}

/// Mutable state shared across the cells of one run.
struct RunState {
    store: RecordStore,
    accepted: usize,
    cap_reached: bool,
    cancelled: bool,
}

/// Paginated, deduplicated, resumable fetcher for one tile at a time.
pub struct AcquisitionEngine<C: AsyncHttpClient> {
    api: C,
    assets: C,
    config: FetchConfig,
    cancel: CancellationToken,
}

impl<C: AsyncHttpClient> AcquisitionEngine<C> {
    /// Creates an engine.
    ///
    /// `api` carries the credential; `assets` downloads images from
    /// whatever host the thumbnail URLs point at.
    pub fn new(api: C, assets: C, config: FetchConfig) -> Self {
        Self {
            api,
            assets,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Uses an external cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Fetches all records within `region` (WGS84) for `tile`.
    pub async fn run(
        &self,
        tile: TileId,
        region: Bounds,
        target: &AcquisitionTarget,
    ) -> Result<AcquisitionReport, AcquisitionError> {
        let store = RecordStore::open(&target.meta_path)?;
        if !store.is_empty() {
            info!(tile = %tile, existing = store.len(), "Resuming; known records will be skipped");
        }

        let cells = region.subdivide(self.config.subdivide.clamp(1, MAX_SUBDIVIDE));
        info!(
            tile = %tile,
            cells = cells.len(),
            max_records = self.config.max_records,
            "Starting acquisition"
        );

        let mut state = RunState {
            store,
            accepted: 0,
            cap_reached: false,
            cancelled: false,
        };
        let mut reports = Vec::with_capacity(cells.len());

        for (index, cell) in cells.into_iter().enumerate() {
            if state.cap_reached || state.cancelled {
                break;
            }
            if index > 0 && !sleep_or_cancel(&self.cancel, self.config.politeness_delay).await {
                state.cancelled = true;
                break;
            }

            let report = self.fetch_cell(tile, index, cell, target, &mut state).await?;
            if report.is_failed() {
                warn!(
                    tile = %tile,
                    cell = index,
                    error = report.error.as_deref().unwrap_or("unknown"),
                    "Cell failed, continuing with next cell"
                );
            } else {
                info!(
                    tile = %tile,
                    cell = index,
                    pages = report.pages,
                    accepted = report.accepted,
                    duplicates = report.duplicates,
                    total = state.accepted,
                    "Cell finished"
                );
            }
            reports.push(report);
        }

        if state.cap_reached {
            info!(tile = %tile, max_records = self.config.max_records, "Record cap reached");
        }
        if state.cancelled {
            warn!(tile = %tile, accepted = state.accepted, "Acquisition cancelled");
        }

        Ok(AcquisitionReport {
            tile,
            cells: reports,
            accepted: state.accepted,
            dedup_size: state.store.len(),
            cap_reached: state.cap_reached,
            cancelled: state.cancelled,
        })
    }

    async fn fetch_cell(
        &self,
        tile: TileId,
        index: usize,
        bounds: Bounds,
        target: &AcquisitionTarget,
        state: &mut RunState,
    ) -> Result<CellReport, AcquisitionError> {
        let mut report = CellReport::new(index, bounds);
        let query = ImageQuery::new(&self.config.base_url, bounds).with_limit(self.config.page_size);
        let mut url = match query.url(None) {
            Ok(url) => url,
            Err(e) => {
                report.fail(e);
                return Ok(report);
            }
        };

        let fetcher = AssetFetcher {
            client: &self.assets,
            config: &self.config.assets,
            dirs: &target.assets,
            retry: &self.config.retry,
            cancel: &self.cancel,
        };

        loop {
            report.transition(CellState::FetchingPage);
            let body = match self.fetch_page(&url, &mut report).await {
                PageFetch::Body(body) => body,
                PageFetch::Failed(e) => {
                    report.fail(e);
                    return Ok(report);
                }
                PageFetch::Unauthorized(source) => {
                    report.fail(&source);
                    return Err(AcquisitionError::Unauthorized { tile, source });
                }
                PageFetch::Cancelled => {
                    state.cancelled = true;
                    return Ok(report);
                }
            };

            // The whole page is decoded before anything is persisted.
            let page = match ApiPage::parse(&body) {
                Ok(page) => page,
                Err(e) => {
                    report.fail(e);
                    return Ok(report);
                }
            };
            report.pages += 1;
            report.transition(CellState::Received);
            debug!(tile = %tile, cell = index, page = report.pages, items = page.data.len(), "Page received");

            for item in &page.data {
                if self.cancel.is_cancelled() {
                    state.cancelled = true;
                    return Ok(report);
                }
                self.ingest(tile, item, &fetcher, &mut report, state).await?;
                if state.cap_reached {
                    report.transition(CellState::Done);
                    return Ok(report);
                }
            }

            let Some(continuation) = page.continuation() else {
                report.transition(CellState::Done);
                return Ok(report);
            };
            url = match query.continue_with(&continuation) {
                Ok(url) => url,
                Err(e) => {
                    report.fail(e);
                    return Ok(report);
                }
            };

            if !sleep_or_cancel(&self.cancel, self.config.politeness_delay).await {
                state.cancelled = true;
                return Ok(report);
            }
        }
    }

    async fn ingest<A: AsyncHttpClient>(
        &self,
        tile: TileId,
        item: &serde_json::Value,
        fetcher: &AssetFetcher<'_, A>,
        report: &mut CellReport,
        state: &mut RunState,
    ) -> Result<(), AcquisitionError> {
        let record = match Record::from_api(item, tile, &self.config.source) {
            Ok(record) => record,
            Err(reason) => {
                debug!(tile = %tile, reason = %reason, "Rejected item");
                report.rejected += 1;
                return Ok(());
            }
        };

        if let Some(filter) = &self.config.device_filter {
            if !record.matches_device(filter) {
                report.filtered_out += 1;
                return Ok(());
            }
        }

        if state.store.contains(&record.id) {
            report.duplicates += 1;
            return Ok(());
        }

        let record = fetcher.fetch(record).await;
        if state.store.append(&record)? {
            report.accepted += 1;
            state.accepted += 1;
        }

        if self.config.max_records > 0 && state.accepted >= self.config.max_records {
            state.cap_reached = true;
        }
        Ok(())
    }

    async fn fetch_page(&self, url: &str, report: &mut CellReport) -> PageFetch {
        let mut retries = 0;
        loop {
            report.attempts += 1;
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return PageFetch::Cancelled,
                result = self.api.get(url) => result,
            };

            let error = match result {
                Ok(body) => return PageFetch::Body(body),
                Err(e) => e,
            };

            match error.kind() {
                FailureKind::Unauthorized => return PageFetch::Unauthorized(error),
                kind if kind.is_retryable() && self.config.retry.should_retry(retries) => {
                    let delay = self.config.retry.delay_for_retry(retries);
                    warn!(
                        cell = report.index,
                        attempt = retries + 1,
                        max_retries = self.config.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Request failed, retrying"
                    );
                    report.transition(CellState::RetryWait);
                    if !sleep_or_cancel(&self.cancel, delay).await {
                        return PageFetch::Cancelled;
                    }
                    report.transition(CellState::FetchingPage);
                    retries += 1;
                }
                _ => return PageFetch::Failed(error),
            }
        }
    }
}
