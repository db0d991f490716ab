//! Manifests and the global index
//!
//! A [`TileManifest`] summarizes what exists on disk for one tile. Building
//! it is split in two so the interesting part stays pure:
//!
//! ```text
//! collect_inputs (filesystem probing) ──► ManifestInputs ──► build_manifest (pure)
//! ```
//!
//! Many manifests reduce into one [`Index`] through [`Summary::merge`], which
//! is commutative and associative with [`Summary::default`] as identity, so
//! the aggregate does not depend on the order tiles are visited in.
//!
//! Unknown values stay unknown: a missing record file yields a `null` count,
//! never 0, and `null + n = n`.

mod aggregate;
mod collect;

pub use aggregate::{
    aggregate_root, read_manifest, write_index, AggregateError, AggregateOptions, Index,
    Summary, SummaryCounts, SummarySpans, TileEntry, INDEX_VERSION,
};
pub use collect::{collect_inputs, count_jpegs, ReferenceInputs};

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use geo_types::Polygon;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::coord::TileId;
use crate::geometry::{to_wkt, Bounds};
use crate::store::{write_atomic, StoreError};

/// Errors building or writing a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to encode manifest: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Earliest and latest timestamp of a set, serialized as `[start, end]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSpan(pub Option<DateTime<Utc>>, pub Option<DateTime<Utc>>);

impl TimeSpan {
    /// Span of a single instant.
    pub fn at(t: DateTime<Utc>) -> Self {
        TimeSpan(Some(t), Some(t))
    }

    /// Span covering every timestamp in `times`.
    pub fn of(times: impl IntoIterator<Item = DateTime<Utc>>) -> Self {
        times
            .into_iter()
            .fold(TimeSpan::default(), |span, t| span.merge(&TimeSpan::at(t)))
    }

    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.0
    }

    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.1
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none() && self.1.is_none()
    }

    /// Coordinate-wise min/max, ignoring unknown ends.
    pub fn merge(&self, other: &TimeSpan) -> TimeSpan {
        TimeSpan(
            min_opt(self.0, other.0),
            max_opt(self.1, other.1),
        )
    }
}

fn min_opt<T: Ord>(a: Option<T>, b: Option<T>) -> Option<T> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn max_opt<T: Ord>(a: Option<T>, b: Option<T>) -> Option<T> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

/// Sum where unknown absorbs only unknown.
pub(crate) fn add_opt(a: Option<u64>, b: Option<u64>) -> Option<u64> {
    match (a, b) {
        (None, None) => None,
        (a, b) => Some(a.unwrap_or(0) + b.unwrap_or(0)),
    }
}

/// Record and image counts; `None` means the input did not exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageryCounts {
    pub raw: Option<u64>,
    pub clean: Option<u64>,
    pub images: Option<u64>,
    pub images_clean: Option<u64>,
    pub images_full: Option<u64>,
    pub images_full_clean: Option<u64>,
}

impl ImageryCounts {
    /// Field-wise [`add_opt`].
    pub fn merge(&self, other: &ImageryCounts) -> ImageryCounts {
        ImageryCounts {
            raw: add_opt(self.raw, other.raw),
            clean: add_opt(self.clean, other.clean),
            images: add_opt(self.images, other.images),
            images_clean: add_opt(self.images_clean, other.images_clean),
            images_full: add_opt(self.images_full, other.images_full),
            images_full_clean: add_opt(self.images_full_clean, other.images_full_clean),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageryTimeSpans {
    pub raw: TimeSpan,
    pub clean: TimeSpan,
}

/// Reference geometry section of a manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceInfo {
    pub path: Option<PathBuf>,
    pub layer: Option<String>,
    #[serde(default)]
    pub layers: Vec<String>,
    pub bounds: Option<Bounds>,
}

/// Imagery section of a manifest. Paths are present only if they exist.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageryInfo {
    pub dir: Option<PathBuf>,
    pub images_dir: Option<PathBuf>,
    pub images_clean_dir: Option<PathBuf>,
    pub images_full_dir: Option<PathBuf>,
    pub images_full_clean_dir: Option<PathBuf>,
    pub records: Option<PathBuf>,
    pub records_clean: Option<PathBuf>,
    #[serde(default)]
    pub counts: ImageryCounts,
    #[serde(default)]
    pub time_spans: ImageryTimeSpans,
}

/// Per-tile summary written to `processed/<t>/manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileManifest {
    pub tile_id: TileId,
    pub created_at: DateTime<Utc>,
    pub crs: String,
    pub tile_polygon_wkt: Option<String>,
    #[serde(default)]
    pub reference: ReferenceInfo,
    #[serde(default)]
    pub imagery: ImageryInfo,
}

/// Timestamps of one record file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSummary {
    pub path: PathBuf,
    pub count: u64,
    /// Capture times of the rows that have one.
    pub times: Vec<DateTime<Utc>>,
}

/// Everything a manifest is built from.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestInputs {
    pub tile: TileId,
    pub crs: String,
    pub created_at: DateTime<Utc>,
    pub tile_polygon: Option<Polygon<f64>>,
    pub reference: ReferenceInputs,
    pub imagery_dir: Option<PathBuf>,
    pub images_dir: Option<PathBuf>,
    pub images_clean_dir: Option<PathBuf>,
    pub images_full_dir: Option<PathBuf>,
    pub images_full_clean_dir: Option<PathBuf>,
    /// Raw records, `None` if the file is missing or unreadable.
    pub raw: Option<RecordSummary>,
    pub clean: Option<RecordSummary>,
    /// Image counts keyed like [`ImageryCounts`].
    pub images: Option<u64>,
    pub images_clean: Option<u64>,
    pub images_full: Option<u64>,
    pub images_full_clean: Option<u64>,
}

impl ManifestInputs {
    /// Inputs for a tile with nothing on disk.
    pub fn empty(tile: TileId, crs: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            tile,
            crs: crs.into(),
            created_at,
            tile_polygon: None,
            reference: ReferenceInputs::default(),
            imagery_dir: None,
            images_dir: None,
            images_clean_dir: None,
            images_full_dir: None,
            images_full_clean_dir: None,
            raw: None,
            clean: None,
            images: None,
            images_clean: None,
            images_full: None,
            images_full_clean: None,
        }
    }
}

/// Builds a manifest from collected inputs.
pub fn build_manifest(inputs: ManifestInputs) -> TileManifest {
    let span = |s: &Option<RecordSummary>| {
        s.as_ref()
            .map(|s| TimeSpan::of(s.times.iter().copied()))
            .unwrap_or_default()
    };

    let counts = ImageryCounts {
        raw: inputs.raw.as_ref().map(|s| s.count),
        clean: inputs.clean.as_ref().map(|s| s.count),
        images: inputs.images,
        images_clean: inputs.images_clean,
        images_full: inputs.images_full,
        images_full_clean: inputs.images_full_clean,
    };
    let time_spans = ImageryTimeSpans {
        raw: span(&inputs.raw),
        clean: span(&inputs.clean),
    };

    TileManifest {
        tile_id: inputs.tile,
        created_at: inputs.created_at,
        crs: inputs.crs,
        tile_polygon_wkt: inputs.tile_polygon.map(|p| to_wkt(&p.into())),
        reference: ReferenceInfo {
            path: inputs.reference.path,
            layer: inputs.reference.layer,
            layers: inputs.reference.layers,
            bounds: inputs.reference.bounds,
        },
        imagery: ImageryInfo {
            dir: inputs.imagery_dir,
            images_dir: inputs.images_dir,
            images_clean_dir: inputs.images_clean_dir,
            images_full_dir: inputs.images_full_dir,
            images_full_clean_dir: inputs.images_full_clean_dir,
            records: inputs.raw.map(|s| s.path),
            records_clean: inputs.clean.map(|s| s.path),
            counts,
            time_spans,
        },
    }
}

/// Writes a manifest atomically as pretty JSON.
pub fn write_manifest(path: &Path, manifest: &TileManifest) -> Result<(), ManifestError> {
    let json = serde_json::to_vec_pretty(manifest)?;
    write_atomic(path, &json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    #[test]
    fn test_time_span_of() {
        let span = TimeSpan::of([ts(30), ts(10), ts(20)]);
        assert_eq!(span, TimeSpan(Some(ts(10)), Some(ts(30))));
        assert!(TimeSpan::of([]).is_empty());
    }

    #[test]
    fn test_time_span_merge_ignores_unknown() {
        let a = TimeSpan(Some(ts(5)), None);
        let b = TimeSpan(Some(ts(7)), Some(ts(9)));
        assert_eq!(a.merge(&b), TimeSpan(Some(ts(5)), Some(ts(9))));
        assert_eq!(a.merge(&TimeSpan::default()), a);
    }

    #[test]
    fn test_add_opt() {
        assert_eq!(add_opt(None, None), None);
        assert_eq!(add_opt(Some(3), None), Some(3));
        assert_eq!(add_opt(None, Some(0)), Some(0));
        assert_eq!(add_opt(Some(3), Some(4)), Some(7));
    }

    #[test]
    fn test_build_manifest_empty_inputs_are_null() {
        let manifest = build_manifest(ManifestInputs::empty(
            TileId::new(10, 430, 720),
            "EPSG:28992",
            ts(0),
        ));
        assert_eq!(manifest.imagery.counts, ImageryCounts::default());
        assert!(manifest.tile_polygon_wkt.is_none());

        let json = serde_json::to_value(&manifest).unwrap();
        assert!(json["imagery"]["counts"]["raw"].is_null());
        assert_eq!(json["tile_id"], "10-430-720");
        assert_eq!(json["created_at"], "1970-01-01T00:00:00Z");
        assert_eq!(json["imagery"]["time_spans"]["raw"], serde_json::json!([null, null]));
    }

    #[test]
    fn test_build_manifest_counts_and_spans() {
        let mut inputs = ManifestInputs::empty(TileId::new(10, 1, 1), "EPSG:28992", ts(100));
        inputs.tile_polygon = Some(Bounds::new(0.0, 0.0, 1.0, 1.0).to_polygon());
        inputs.raw = Some(RecordSummary {
            path: PathBuf::from("meta_projected.jsonl"),
            count: 3,
            times: vec![ts(20), ts(10)],
        });
        inputs.clean = Some(RecordSummary {
            path: PathBuf::from("meta_clean.jsonl"),
            count: 0,
            times: vec![],
        });
        inputs.images = Some(2);

        let m = build_manifest(inputs);
        assert_eq!(m.imagery.counts.raw, Some(3));
        assert_eq!(m.imagery.counts.clean, Some(0));
        assert_eq!(m.imagery.counts.images, Some(2));
        assert_eq!(m.imagery.counts.images_full, None);
        assert_eq!(m.imagery.time_spans.raw, TimeSpan(Some(ts(10)), Some(ts(20))));
        assert!(m.imagery.time_spans.clean.is_empty());
        assert!(m.tile_polygon_wkt.unwrap().starts_with("POLYGON"));
    }

    #[test]
    fn test_manifest_roundtrips_through_json() {
        let mut inputs = ManifestInputs::empty(TileId::new(10, 2, 3), "EPSG:28992", ts(5));
        inputs.reference.bounds = Some(Bounds::new(1.0, 2.0, 3.0, 4.0));
        let m = build_manifest(inputs);
        let text = serde_json::to_string(&m).unwrap();
        let back: TileManifest = serde_json::from_str(&text).unwrap();
        assert_eq!(back, m);
    }
}
