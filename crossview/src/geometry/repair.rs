//! Reference geometry repair.
//!
//! Footprint exports routinely contain multi-part shapes, duplicated vertices,
//! self-intersecting rings and slivers. Repair flattens everything to valid
//! single polygons and drops the parts that cannot be made usable; dropped
//! parts are counted, never fatal.

use geo::orient::{Direction, Orient};
use geo::{Area, BooleanOps, CoordsIter, RemoveRepeatedPoints, Validation};
use geo_types::{Geometry, LineString, MultiPolygon, Polygon};
use tracing::{debug, warn};

/// Result of repairing a geometry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepairOutcome {
    /// Usable single-part polygons, consistently oriented.
    pub parts: Vec<Polygon<f64>>,
    /// Parts that were discarded.
    pub dropped: usize,
}

impl RepairOutcome {
    /// Appends another outcome.
    pub fn extend(&mut self, other: RepairOutcome) {
        self.parts.extend(other.parts);
        self.dropped += other.dropped;
    }
}

/// Explodes and repairs a geometry into valid single polygons.
///
/// Non-polygonal members (points, lines) count as dropped parts.
pub fn repair_polygons(geometry: Geometry<f64>) -> RepairOutcome {
    let mut raw = Vec::new();
    let mut dropped = explode(geometry, &mut raw);

    let mut parts = Vec::with_capacity(raw.len());
    for polygon in raw {
        let repaired = repair_one(polygon);
        if repaired.is_empty() {
            dropped += 1;
        }
        parts.extend(repaired);
    }

    if dropped > 0 {
        warn!(dropped, kept = parts.len(), "Dropped unusable geometry parts");
    }

    RepairOutcome { parts, dropped }
}

fn explode(geometry: Geometry<f64>, out: &mut Vec<Polygon<f64>>) -> usize {
    match geometry {
        Geometry::Polygon(p) => {
            out.push(p);
            0
        }
        Geometry::MultiPolygon(mp) => {
            out.extend(mp.0);
            0
        }
        Geometry::Rect(r) => {
            out.push(r.to_polygon());
            0
        }
        Geometry::Triangle(t) => {
            out.push(t.to_polygon());
            0
        }
        Geometry::GeometryCollection(gc) => gc.0.into_iter().map(|g| explode(g, out)).sum(),
        _ => 1,
    }
}

fn repair_one(polygon: Polygon<f64>) -> Vec<Polygon<f64>> {
    if polygon.coords_iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
        return Vec::new();
    }

    let polygon = polygon.remove_repeated_points();
    let (exterior, interiors) = polygon.into_inner();
    if distinct_vertices(&exterior) < 3 {
        return Vec::new();
    }

    let interiors: Vec<LineString<f64>> = interiors
        .into_iter()
        .filter(|ring| {
            distinct_vertices(ring) >= 3
                && Polygon::new(ring.clone(), vec![]).unsigned_area() > 0.0
        })
        .collect();

    let repaired = Polygon::new(exterior, interiors);
    let parts = if repaired.is_valid() {
        vec![repaired]
    } else {
        // Self-intersecting or crossing rings: rebuild from the even-odd
        // fill, which splits a bowtie into its two lobes.
        let rebuilt = repaired.union(&MultiPolygon::<f64>::new(Vec::new()));
        debug!(parts = rebuilt.0.len(), "Rebuilt invalid polygon");
        rebuilt.0
    };

    parts
        .into_iter()
        .filter(|p| p.unsigned_area() > 0.0)
        .map(|p| p.orient(Direction::Default))
        .collect()
}

fn distinct_vertices(ring: &LineString<f64>) -> usize {
    let n = ring.0.len();
    if ring.is_closed() && n > 0 {
        n - 1
    } else {
        n
    }
}
