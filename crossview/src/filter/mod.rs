//! Spatial filter
//!
//! Classifies projected records against the tile boundary and a set of
//! reference footprints in the same planar CRS:
//!
//! ```text
//! inside    = tile polygon strictly contains the point
//! distance  = min distance to any reference polygon (0 on or inside one)
//! is_clean  = inside && distance <= threshold
//! ```
//!
//! Nearest-distance queries go through an R-tree of the repaired reference
//! polygons, so each record costs a logarithmic search rather than a scan.
//!
//! # Example
//!
//! ```ignore
//! use crossview::filter::SpatialFilter;
//!
//! let filter = SpatialFilter::new(tile_polygon, references, 30.0);
//! let c = filter.classify(121_300.0, 487_300.0);
//! if c.is_clean { /* keep */ }
//! ```

mod clean;
mod footprints;

pub use clean::{link_images, write_clean_subset, CleanOutcome, LinkMode};
pub use footprints::{
    footprint_path, load_reference, FootprintError, ReferenceSet, DEFAULT_LAYERS,
};

use std::path::{Path, PathBuf};

use geo::{Contains, Distance, Euclidean};
use geo_types::{Point, Polygon};
use rstar::{PointDistance, RTree, RTreeObject, AABB};
use thiserror::Error;
use tracing::info;

use crate::geometry::{repair_polygons, Bounds};
use crate::record::{AnnotatedRecord, ProjectedRecord};
use crate::store::{read_jsonl, write_jsonl, StoreError};

/// Default clean-distance threshold in metres.
pub const DEFAULT_DISTANCE_THRESHOLD_M: f64 = 30.0;

/// Errors from the filter and clean steps.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error(transparent)]
    Footprint(#[from] FootprintError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to link {path}: {source}")]
    Link {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Filter settings.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterConfig {
    /// Records farther than this from every reference are not clean.
    pub distance_threshold_m: f64,
    /// Reference layers in priority order.
    pub layers: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            distance_threshold_m: DEFAULT_DISTANCE_THRESHOLD_M,
            layers: DEFAULT_LAYERS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl FilterConfig {
    pub fn with_threshold(mut self, meters: f64) -> Self {
        self.distance_threshold_m = meters;
        self
    }

    pub fn with_layers(mut self, layers: Vec<String>) -> Self {
        if !layers.is_empty() {
            self.layers = layers;
        }
        self
    }
}

/// Classification of one point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub inside: bool,
    /// `None` when there are no reference geometries.
    pub distance: Option<f64>,
    pub is_clean: bool,
}

/// Counts produced by [`SpatialFilter::annotate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub total: usize,
    pub inside: usize,
    pub clean: usize,
}

struct Reference {
    polygon: Polygon<f64>,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for Reference {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

impl PointDistance for Reference {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let d = Euclidean.distance(&Point::new(point[0], point[1]), &self.polygon);
        d * d
    }
}

/// Nearest-reference classifier for one tile.
pub struct SpatialFilter {
    tile: Polygon<f64>,
    tree: RTree<Reference>,
    threshold: f64,
    dropped: usize,
}

impl SpatialFilter {
    /// Builds the filter, repairing references and indexing them.
    pub fn new(tile: Polygon<f64>, references: Vec<Polygon<f64>>, threshold: f64) -> Self {
        let mut dropped = 0;
        let mut items = Vec::with_capacity(references.len());
        for polygon in references {
            let outcome = repair_polygons(polygon.into());
            dropped += outcome.dropped;
            for part in outcome.parts {
                if let Some(b) = Bounds::of_polygon(&part) {
                    items.push(Reference {
                        envelope: AABB::from_corners([b.min_x, b.min_y], [b.max_x, b.max_y]),
                        polygon: part,
                    });
                }
            }
        }

        Self {
            tile,
            tree: RTree::bulk_load(items),
            threshold,
            dropped,
        }
    }

    /// Number of indexed reference parts.
    pub fn reference_count(&self) -> usize {
        self.tree.size()
    }

    /// Reference parts discarded during repair.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Distance from a point to the nearest reference polygon.
    pub fn nearest_distance(&self, x: f64, y: f64) -> Option<f64> {
        self.tree
            .nearest_neighbor(&[x, y])
            .map(|r| Euclidean.distance(&Point::new(x, y), &r.polygon))
    }

    /// Classifies one point.
    pub fn classify(&self, x: f64, y: f64) -> Classification {
        let inside = self.tile.contains(&Point::new(x, y));
        let distance = self.nearest_distance(x, y);
        let is_clean = inside && distance.is_some_and(|d| d <= self.threshold);
        Classification {
            inside,
            distance,
            is_clean,
        }
    }

    /// Classifies every record.
    pub fn annotate(&self, records: Vec<ProjectedRecord>) -> (Vec<AnnotatedRecord>, FilterStats) {
        let mut stats = FilterStats::default();
        let annotated = records
            .into_iter()
            .map(|projected| {
                let c = self.classify(projected.x, projected.y);
                stats.total += 1;
                stats.inside += c.inside as usize;
                stats.clean += c.is_clean as usize;
                AnnotatedRecord {
                    projected,
                    inside_tile: c.inside,
                    dist_to_ref_m: c.distance,
                    is_clean: c.is_clean,
                }
            })
            .collect();
        (annotated, stats)
    }
}

/// Annotates `input` (projected records) into `output`.
pub fn annotate_file(
    filter: &SpatialFilter,
    input: &Path,
    output: &Path,
) -> Result<FilterStats, FilterError> {
    let records: Vec<ProjectedRecord> = read_jsonl(input)?;
    let (annotated, stats) = filter.annotate(records);
    write_jsonl(output, &annotated)?;
    info!(
        output = %output.display(),
        total = stats.total,
        inside = stats.inside,
        clean = stats.clean,
        threshold_m = filter.threshold(),
        "Annotated records"
    );
    Ok(stats)
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn square(x0: f64, y0: f64, size: f64) -> Polygon<f64> {
        Bounds::new(x0, y0, x0 + size, y0 + size).to_polygon()
    }

    proptest! {
        #[test]
        fn prop_tree_matches_linear_scan(x in -50.0f64..150.0, y in -50.0f64..150.0) {
            let refs = vec![
                square(10.0, 10.0, 10.0),
                square(60.0, 60.0, 20.0),
                square(-30.0, 90.0, 5.0),
                square(120.0, -20.0, 15.0),
            ];
            let f = SpatialFilter::new(square(0.0, 0.0, 100.0), refs.clone(), 5.0);
            let p = Point::new(x, y);
            let linear = refs
                .iter()
                .map(|r| Euclidean.distance(&p, r))
                .fold(f64::INFINITY, f64::min);
            let tree = f.nearest_distance(x, y).unwrap();
            prop_assert!((tree - linear).abs() < 1e-9);
            prop_assert!(tree >= 0.0);
        }
    }
}
