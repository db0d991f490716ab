//! Filesystem probing for manifest inputs.

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use geo_types::Polygon;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{ManifestInputs, RecordSummary};
use crate::coord::TileId;
use crate::filter::ReferenceSet;
use crate::geometry::Bounds;
use crate::pipeline::DataLayout;
use crate::store::read_jsonl;

/// Reference geometry facts for a manifest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceInputs {
    pub path: Option<PathBuf>,
    pub layer: Option<String>,
    pub layers: Vec<String>,
    pub bounds: Option<Bounds>,
}

impl From<&ReferenceSet> for ReferenceInputs {
    fn from(r: &ReferenceSet) -> Self {
        Self {
            path: Some(r.path.clone()),
            layer: Some(r.layer.clone()),
            layers: r.layers.clone(),
            bounds: r.bounds,
        }
    }
}

#[derive(Deserialize)]
struct CaptureTime {
    #[serde(default)]
    captured_at_utc: Option<DateTime<Utc>>,
    #[serde(default)]
    captured_at: Option<i64>,
}

impl CaptureTime {
    fn resolve(&self) -> Option<DateTime<Utc>> {
        self.captured_at_utc.or_else(|| {
            self.captured_at
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        })
    }
}

fn existing(path: PathBuf) -> Option<PathBuf> {
    path.exists().then_some(path)
}

fn summarize_records(path: &Path) -> Option<RecordSummary> {
    if !path.exists() {
        return None;
    }
    match read_jsonl::<CaptureTime>(path) {
        Ok(rows) => Some(RecordSummary {
            path: path.to_path_buf(),
            count: rows.len() as u64,
            times: rows.iter().filter_map(CaptureTime::resolve).collect(),
        }),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Unreadable record file");
            None
        }
    }
}

/// Number of `*.jpg` files in `dir`, `None` if it does not exist.
pub fn count_jpegs(dir: &Path) -> Option<u64> {
    if !dir.is_dir() {
        return None;
    }
    let pattern = format!(
        "{}/*.jpg",
        glob::Pattern::escape(&dir.to_string_lossy())
    );
    match glob::glob(&pattern) {
        Ok(paths) => Some(paths.filter_map(Result::ok).count() as u64),
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "Invalid glob pattern");
            None
        }
    }
}

/// Probes the layout for everything a tile's manifest reports.
///
/// Raw counts come from the projected records when present, otherwise from
/// the raw store.
pub fn collect_inputs(
    layout: &DataLayout,
    tile: &TileId,
    crs: &str,
    tile_polygon: Option<Polygon<f64>>,
    reference: ReferenceInputs,
    created_at: DateTime<Utc>,
) -> ManifestInputs {
    let projected = layout.meta_projected(tile);
    let raw_path = if projected.exists() {
        projected
    } else {
        layout.meta(tile)
    };

    let images_dir = existing(layout.images(tile));
    let images_clean_dir = existing(layout.images_clean(tile));
    let images_full_dir = existing(layout.images_full(tile));
    let images_full_clean_dir = existing(layout.images_full_clean(tile));

    let mut inputs = ManifestInputs::empty(*tile, crs, created_at);
    inputs.tile_polygon = tile_polygon;
    inputs.reference = reference;
    inputs.imagery_dir = existing(layout.imagery_dir(tile));
    inputs.raw = summarize_records(&raw_path);
    inputs.clean = summarize_records(&layout.meta_clean(tile));
    inputs.images = images_dir.as_deref().and_then(count_jpegs);
    inputs.images_clean = images_clean_dir.as_deref().and_then(count_jpegs);
    inputs.images_full = images_full_dir.as_deref().and_then(count_jpegs);
    inputs.images_full_clean = images_full_clean_dir.as_deref().and_then(count_jpegs);
    inputs.images_dir = images_dir;
    inputs.images_clean_dir = images_clean_dir;
    inputs.images_full_dir = images_full_dir;
    inputs.images_full_clean_dir = images_full_clean_dir;
    inputs
}
