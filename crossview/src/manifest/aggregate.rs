//! Cross-tile reduction of manifests into the global index.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use super::{count_jpegs, ImageryCounts, ImageryTimeSpans, ManifestError, TileManifest, TimeSpan};
use crate::coord::TileId;
use crate::geometry::Bounds;
use crate::store::write_atomic;

/// Index schema version.
pub const INDEX_VERSION: u32 = 1;

/// Run-fatal aggregation errors.
#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("root not found: {0}")]
    RootNotFound(PathBuf),

    /// Nothing under the root could be read.
    #[error("no readable manifests under {0}")]
    NoManifests(PathBuf),

    #[error("failed to list {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Write(#[from] ManifestError),
}

/// Aggregate counts across tiles.
pub type SummaryCounts = ImageryCounts;

/// Aggregate spans across tiles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummarySpans {
    pub manifests_created: TimeSpan,
    pub raw: TimeSpan,
    pub clean: TimeSpan,
}

/// Reducible summary of one or more manifests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub tiles: u64,
    pub counts: SummaryCounts,
    pub time_spans: SummarySpans,
    pub bounds: Option<Bounds>,
}

impl Summary {
    /// Summary of a single manifest.
    pub fn from_manifest(manifest: &TileManifest) -> Self {
        Self {
            tiles: 1,
            counts: manifest.imagery.counts,
            time_spans: SummarySpans {
                manifests_created: TimeSpan::at(manifest.created_at),
                raw: manifest.imagery.time_spans.raw,
                clean: manifest.imagery.time_spans.clean,
            },
            bounds: manifest.reference.bounds,
        }
    }

    /// Commutative, associative combination with `Summary::default()` as
    /// identity.
    pub fn merge(&self, other: &Summary) -> Summary {
        Summary {
            tiles: self.tiles + other.tiles,
            counts: self.counts.merge(&other.counts),
            time_spans: SummarySpans {
                manifests_created: self
                    .time_spans
                    .manifests_created
                    .merge(&other.time_spans.manifests_created),
                raw: self.time_spans.raw.merge(&other.time_spans.raw),
                clean: self.time_spans.clean.merge(&other.time_spans.clean),
            },
            bounds: match (self.bounds, other.bounds) {
                (Some(a), Some(b)) => Some(a.union(&b)),
                (a, b) => a.or(b),
            },
        }
    }
}

impl<'a> FromIterator<&'a TileManifest> for Summary {
    fn from_iter<I: IntoIterator<Item = &'a TileManifest>>(iter: I) -> Self {
        iter.into_iter()
            .map(Summary::from_manifest)
            .fold(Summary::default(), |acc, s| acc.merge(&s))
    }
}

/// Compact per-tile entry embedded in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileEntry {
    pub tile_id: TileId,
    pub manifest_path: PathBuf,
    pub crs: String,
    pub has_reference: bool,
    pub has_imagery: bool,
    pub counts: ImageryCounts,
    pub time_spans: ImageryTimeSpans,
}

/// The global index written to `processed/index.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Index {
    pub created_at: DateTime<Utc>,
    pub root: PathBuf,
    pub version: u32,
    pub summary: Summary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tiles: Option<Vec<TileEntry>>,
}

/// Aggregation options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateOptions {
    /// Embed per-tile entries.
    pub include_tiles: bool,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            include_tiles: true,
        }
    }
}

/// Reads one manifest file.
pub fn read_manifest(path: &Path) -> Result<TileManifest, String> {
    let text = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    serde_json::from_str(&text).map_err(|e| e.to_string())
}

/// Fills image counts the manifest left unknown by counting the recorded
/// directories.
fn backfill_counts(manifest: &mut TileManifest) {
    let imagery = &mut manifest.imagery;
    let fill = |count: &mut Option<u64>, dir: &Option<PathBuf>| {
        if count.is_none() {
            *count = dir.as_deref().and_then(count_jpegs);
        }
    };
    fill(&mut imagery.counts.images, &imagery.images_dir);
    fill(&mut imagery.counts.images_clean, &imagery.images_clean_dir);
    fill(&mut imagery.counts.images_full, &imagery.images_full_dir);
    fill(
        &mut imagery.counts.images_full_clean,
        &imagery.images_full_clean_dir,
    );
}

fn manifest_paths(root: &Path) -> Result<Vec<PathBuf>, AggregateError> {
    let entries = std::fs::read_dir(root).map_err(|e| AggregateError::Io {
        path: root.to_path_buf(),
        source: e,
    })?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .map(|p| p.join("manifest.json"))
        .filter(|p| p.is_file())
        .collect();
    paths.sort();
    Ok(paths)
}

/// Reduces every `<root>/*/manifest.json` into an index.
pub fn aggregate_root(root: &Path, options: AggregateOptions) -> Result<Index, AggregateError> {
    if !root.is_dir() {
        return Err(AggregateError::RootNotFound(root.to_path_buf()));
    }

    let mut summary = Summary::default();
    let mut tiles = Vec::new();
    for path in manifest_paths(root)? {
        let mut manifest = match read_manifest(&path) {
            Ok(m) => m,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read manifest, skipping");
                continue;
            }
        };
        backfill_counts(&mut manifest);
        summary = summary.merge(&Summary::from_manifest(&manifest));

        if options.include_tiles {
            tiles.push(TileEntry {
                tile_id: manifest.tile_id,
                manifest_path: path,
                has_reference: manifest.reference.path.is_some(),
                has_imagery: manifest.imagery.dir.is_some(),
                crs: manifest.crs,
                counts: manifest.imagery.counts,
                time_spans: manifest.imagery.time_spans,
            });
        }
    }

    if summary.tiles == 0 {
        return Err(AggregateError::NoManifests(root.to_path_buf()));
    }

    info!(
        root = %root.display(),
        tiles = summary.tiles,
        raw = summary.counts.raw,
        clean = summary.counts.clean,
        "Aggregated manifests"
    );

    Ok(Index {
        created_at: Utc::now(),
        root: root.to_path_buf(),
        version: INDEX_VERSION,
        summary,
        tiles: options.include_tiles.then_some(tiles),
    })
}

/// Writes the index atomically as pretty JSON.
pub fn write_index(path: &Path, index: &Index) -> Result<(), AggregateError> {
    let json = serde_json::to_vec_pretty(index).map_err(ManifestError::from)?;
    write_atomic(path, &json).map_err(ManifestError::from)?;
    info!(path = %path.display(), "Wrote index");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{build_manifest, write_manifest, ManifestInputs, RecordSummary};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    fn manifest(x: u32, raw: Option<u64>, bounds: Option<Bounds>, created: i64) -> TileManifest {
        let mut inputs = ManifestInputs::empty(TileId::new(10, x, 1), "EPSG:28992", ts(created));
        inputs.raw = raw.map(|count| RecordSummary {
            path: PathBuf::from("meta.jsonl"),
            count,
            times: vec![ts(created * 10)],
        });
        inputs.reference.bounds = bounds;
        build_manifest(inputs)
    }

    #[test]
    fn test_merge_identity() {
        let s = Summary::from_manifest(&manifest(1, Some(5), None, 1));
        assert_eq!(s.merge(&Summary::default()), s);
        assert_eq!(Summary::default().merge(&s), s);
    }

    #[test]
    fn test_unknown_counts_stay_unknown() {
        let a = Summary::from_manifest(&manifest(1, None, None, 1));
        let b = Summary::from_manifest(&manifest(2, None, None, 2));
        let merged = a.merge(&b);
        assert_eq!(merged.tiles, 2);
        assert_eq!(merged.counts.raw, None);

        let c = Summary::from_manifest(&manifest(3, Some(4), None, 3));
        assert_eq!(merged.merge(&c).counts.raw, Some(4));
    }

    #[test]
    fn test_bounds_and_spans() {
        let a = manifest(1, Some(1), Some(Bounds::new(0.0, 0.0, 1.0, 1.0)), 5);
        let b = manifest(2, Some(2), Some(Bounds::new(-1.0, 0.5, 0.5, 3.0)), 2);
        let s: Summary = [a, b].iter().collect();
        assert_eq!(s.bounds, Some(Bounds::new(-1.0, 0.0, 1.0, 3.0)));
        assert_eq!(s.time_spans.manifests_created, TimeSpan(Some(ts(2)), Some(ts(5))));
        assert_eq!(s.time_spans.raw, TimeSpan(Some(ts(20)), Some(ts(50))));
        assert_eq!(s.counts.raw, Some(3));
    }

    #[test]
    fn test_aggregate_root_skips_unreadable() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write_manifest(&root.join("10-1-1/manifest.json"), &manifest(1, Some(3), None, 1)).unwrap();
        write_manifest(&root.join("10-2-1/manifest.json"), &manifest(2, Some(4), None, 2)).unwrap();
        std::fs::create_dir_all(root.join("10-3-1")).unwrap();
        std::fs::write(root.join("10-3-1/manifest.json"), "{ not json").unwrap();
        std::fs::write(root.join("index.json"), "{}").unwrap();

        let index = aggregate_root(root, AggregateOptions::default()).unwrap();
        assert_eq!(index.version, INDEX_VERSION);
        assert_eq!(index.summary.tiles, 2);
        assert_eq!(index.summary.counts.raw, Some(7));
        let tiles = index.tiles.unwrap();
        assert_eq!(tiles[0].tile_id, TileId::new(10, 1, 1));
        assert_eq!(tiles[1].tile_id, TileId::new(10, 2, 1));
    }

    #[test]
    fn test_aggregate_backfills_image_counts() {
        let temp = TempDir::new().unwrap();
        let images = temp.path().join("imagery/10-1-1/images");
        std::fs::create_dir_all(&images).unwrap();
        std::fs::write(images.join("a.jpg"), b"").unwrap();

        let mut m = manifest(1, Some(1), None, 1);
        m.imagery.images_dir = Some(images);
        let root = temp.path().join("processed");
        write_manifest(&root.join("10-1-1/manifest.json"), &m).unwrap();

        let index = aggregate_root(&root, AggregateOptions { include_tiles: false }).unwrap();
        assert_eq!(index.summary.counts.images, Some(1));
        assert!(index.tiles.is_none());
    }

    #[test]
    fn test_no_manifests_is_fatal() {
        let temp = TempDir::new().unwrap();
        let result = aggregate_root(temp.path(), AggregateOptions::default());
        assert!(matches!(result, Err(AggregateError::NoManifests(_))));

        let result = aggregate_root(&temp.path().join("missing"), AggregateOptions::default());
        assert!(matches!(result, Err(AggregateError::RootNotFound(_))));
    }

    #[test]
    fn test_write_index() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write_manifest(&root.join("10-1-1/manifest.json"), &manifest(1, Some(3), None, 1)).unwrap();
        let index = aggregate_root(root, AggregateOptions::default()).unwrap();
        write_index(&root.join("index.json"), &index).unwrap();

        let text = std::fs::read_to_string(root.join("index.json")).unwrap();
        let back: Index = serde_json::from_str(&text).unwrap();
        assert_eq!(back.summary, index.summary);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn arb_summary() -> impl Strategy<Value = Summary> {
            (
                0u64..5,
                proptest::option::of(0u64..1000),
                proptest::option::of(0u64..1000),
                proptest::option::of((0i64..1_000_000, 0i64..1_000_000)),
                proptest::option::of((-100.0f64..100.0, -100.0f64..100.0, 0.0f64..50.0)),
            )
                .prop_map(|(tiles, raw, images, span, bounds)| Summary {
                    tiles,
                    counts: ImageryCounts {
                        raw,
                        images,
                        ..ImageryCounts::default()
                    },
                    time_spans: SummarySpans {
                        raw: span
                            .map(|(a, b)| TimeSpan(Some(ts(a.min(b))), Some(ts(a.max(b)))))
                            .unwrap_or_default(),
                        ..SummarySpans::default()
                    },
                    bounds: bounds.map(|(x, y, w)| Bounds::new(x, y, x + w, y + w)),
                })
        }

        proptest! {
            #[test]
            fn prop_merge_is_commutative(a in arb_summary(), b in arb_summary()) {
                prop_assert_eq!(a.merge(&b), b.merge(&a));
            }

            #[test]
            fn prop_merge_is_associative(a in arb_summary(), b in arb_summary(), c in arb_summary()) {
                prop_assert_eq!(a.merge(&b).merge(&c), a.merge(&b.merge(&c)));
            }

            #[test]
            fn prop_reduction_order_independent(
                mut items in proptest::collection::vec(arb_summary(), 0..8),
                seed in any::<u64>(),
            ) {
                let forward = items.iter().fold(Summary::default(), |acc, s| acc.merge(s));
                // Deterministic shuffle from the seed.
                let n = items.len();
                if n > 1 {
                    let mut state = seed;
                    for i in (1..n).rev() {
                        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                        items.swap(i, (state % (i as u64 + 1)) as usize);
                    }
                }
                let shuffled = items.iter().fold(Summary::default(), |acc, s| acc.merge(s));
                prop_assert_eq!(forward, shuffled);
            }
        }
    }
}
