//! Planar geometry primitives
//!
//! [`Bounds`] is the axis-aligned box used for query regions, reference
//! extents and the aggregated index. Polygons and multi-part shapes come from
//! `geo_types`; WKT conversion and repair of reference footprints live in the
//! submodules.
//!
//! # Subdivision
//!
//! Remote queries are capped per request, so a tile region is split into an
//! n×n grid of cells before fetching:
//!
//! ```text
//!   max_y ┌─────┬─────┬─────┐
//!         │  6  │  7  │  8  │
//!         ├─────┼─────┼─────┤
//!         │  3  │  4  │  5  │
//!         ├─────┼─────┼─────┤
//!         │  0  │  1  │  2  │
//!   min_y └─────┴─────┴─────┘
//!       min_x             max_x
//! ```
//!
//! Interior edges are computed once and shared by both neighbours, and the
//! outer edges reuse the original values, so the cells tile the region with
//! no gaps and no overlap beyond shared edges.

mod repair;
mod text;

pub use repair::{repair_polygons, RepairOutcome};
pub use text::{parse_wkt, to_wkt};

use geo::BoundingRect;
use geo_types::{Geometry, Polygon, Rect};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from geometry parsing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    /// The WKT text could not be parsed or converted.
    #[error("invalid WKT: {0}")]
    InvalidWkt(String),
}

/// Axis-aligned bounding box.
///
/// Serialized as `[min_x, min_y, max_x, max_y]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    /// Creates bounds from explicit edges.
    pub const fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Degenerate bounds covering a single point.
    pub const fn from_point(x: f64, y: f64) -> Self {
        Self::new(x, y, x, y)
    }

    /// Bounds of a `geo_types::Rect`.
    pub fn from_rect(rect: Rect<f64>) -> Self {
        Self::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y)
    }

    /// Envelope of a geometry, or `None` if it is empty.
    pub fn of_geometry(geometry: &Geometry<f64>) -> Option<Self> {
        geometry.bounding_rect().map(Self::from_rect)
    }

    /// Envelope of a polygon, or `None` if it is empty.
    pub fn of_polygon(polygon: &Polygon<f64>) -> Option<Self> {
        polygon.bounding_rect().map(Self::from_rect)
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// True when every edge is finite and min does not exceed max.
    pub fn is_valid(&self) -> bool {
        [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .all(|v| v.is_finite())
            && self.min_x <= self.max_x
            && self.min_y <= self.max_y
    }

    /// Coordinate-wise union.
    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }

    /// Grows the box by `margin` on every side.
    pub fn expand(&self, margin: f64) -> Bounds {
        Bounds::new(
            self.min_x - margin,
            self.min_y - margin,
            self.max_x + margin,
            self.max_y + margin,
        )
    }

    /// Edge-inclusive point test.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Edge-inclusive overlap test.
    pub fn intersects(&self, other: &Bounds) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    /// Splits the box into an `n`×`n` grid, south row first, west to east.
    ///
    /// `n <= 1` returns the original bounds.
    pub fn subdivide(&self, n: u32) -> Vec<Bounds> {
        if n <= 1 {
            return vec![*self];
        }

        let xs = split_edges(self.min_x, self.max_x, n);
        let ys = split_edges(self.min_y, self.max_y, n);

        let side = n as usize;
        let mut cells = Vec::with_capacity(side * side);
        for row in ys.windows(2) {
            for col in xs.windows(2) {
                cells.push(Bounds::new(col[0], row[0], col[1], row[1]));
            }
        }
        cells
    }

    /// Closed rectangular polygon of the box.
    pub fn to_polygon(&self) -> Polygon<f64> {
        Rect::new(
            geo_types::coord! { x: self.min_x, y: self.min_y },
            geo_types::coord! { x: self.max_x, y: self.max_y },
        )
        .to_polygon()
    }
}

fn split_edges(min: f64, max: f64, n: u32) -> Vec<f64> {
    let step = (max - min) / n as f64;
    let mut edges: Vec<f64> = (0..n).map(|i| min + step * i as f64).collect();
    edges.push(max);
    edges
}

impl From<[f64; 4]> for Bounds {
    fn from(v: [f64; 4]) -> Self {
        Bounds::new(v[0], v[1], v[2], v[3])
    }
}

impl From<Bounds> for [f64; 4] {
    fn from(b: Bounds) -> Self {
        [b.min_x, b.min_y, b.max_x, b.max_y]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_and_expand() {
        let a = Bounds::new(0.0, 0.0, 1.0, 1.0);
        let b = Bounds::new(-1.0, 0.5, 0.5, 3.0);
        assert_eq!(a.union(&b), Bounds::new(-1.0, 0.0, 1.0, 3.0));
        assert_eq!(a.expand(15.0), Bounds::new(-15.0, -15.0, 16.0, 16.0));
    }

    #[test]
    fn test_contains_is_edge_inclusive() {
        let b = Bounds::new(0.0, 0.0, 10.0, 10.0);
        assert!(b.contains(0.0, 5.0));
        assert!(b.contains(10.0, 10.0));
        assert!(!b.contains(10.01, 5.0));
    }

    #[test]
    fn test_intersects() {
        let a = Bounds::new(0.0, 0.0, 10.0, 10.0);
        assert!(a.intersects(&Bounds::new(10.0, 10.0, 20.0, 20.0)));
        assert!(!a.intersects(&Bounds::new(10.5, 0.0, 20.0, 20.0)));
    }

    #[test]
    fn test_subdivide_one_is_identity() {
        let b = Bounds::new(1.0, 2.0, 3.0, 4.0);
        assert_eq!(b.subdivide(1), vec![b]);
        assert_eq!(b.subdivide(0), vec![b]);
    }

    #[test]
    fn test_subdivide_order_is_south_row_first() {
        let cells = Bounds::new(0.0, 0.0, 2.0, 2.0).subdivide(2);
        assert_eq!(
            cells,
            vec![
                Bounds::new(0.0, 0.0, 1.0, 1.0),
                Bounds::new(1.0, 0.0, 2.0, 1.0),
                Bounds::new(0.0, 1.0, 1.0, 2.0),
                Bounds::new(1.0, 1.0, 2.0, 2.0),
            ]
        );
    }

    #[test]
    fn test_serde_as_array() {
        let b = Bounds::new(1.0, 2.0, 3.0, 4.5);
        assert_eq!(serde_json::to_string(&b).unwrap(), "[1.0,2.0,3.0,4.5]");
        let back: Bounds = serde_json::from_str("[1,2,3,4.5]").unwrap();
        assert_eq!(back, b);
    }

    #[test]
    fn test_is_valid() {
        assert!(Bounds::new(0.0, 0.0, 0.0, 0.0).is_valid());
        assert!(!Bounds::new(1.0, 0.0, 0.0, 1.0).is_valid());
        assert!(!Bounds::new(f64::NAN, 0.0, 1.0, 1.0).is_valid());
    }

    #[test]
    fn test_to_polygon_roundtrips_bounds() {
        let b = Bounds::new(120_000.0, 486_000.0, 121_000.0, 487_000.0);
        assert_eq!(Bounds::of_polygon(&b.to_polygon()), Some(b));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn bounds_strategy() -> impl Strategy<Value = Bounds> {
            (
                -1.0e6f64..1.0e6,
                -1.0e6f64..1.0e6,
                0.001f64..1.0e5,
                0.001f64..1.0e5,
            )
                .prop_map(|(x, y, w, h)| Bounds::new(x, y, x + w, y + h))
        }

        proptest! {
            #[test]
            fn test_subdivision_union_reconstructs_bounds(b in bounds_strategy(), n in 1u32..8) {
                let cells = b.subdivide(n);
                prop_assert_eq!(cells.len(), (n * n) as usize);

                let union = cells.iter().skip(1).fold(cells[0], |acc, c| acc.union(c));
                prop_assert_eq!(union, b);
            }

            #[test]
            fn test_subdivision_has_no_gaps_or_overlap(b in bounds_strategy(), n in 2u32..8) {
                let cells = b.subdivide(n);
                let n = n as usize;
                for row in 0..n {
                    for col in 0..n {
                        let cell = cells[row * n + col];
                        prop_assert!(cell.min_x <= cell.max_x && cell.min_y <= cell.max_y);
                        if col + 1 < n {
                            prop_assert_eq!(cell.max_x, cells[row * n + col + 1].min_x);
                        }
                        if row + 1 < n {
                            prop_assert_eq!(cell.max_y, cells[(row + 1) * n + col].min_y);
                        }
                    }
                }

                let area: f64 = cells.iter().map(|c| c.width() * c.height()).sum();
                let expected = b.width() * b.height();
                prop_assert!((area - expected).abs() <= expected * 1e-9);
            }
        }
    }
}
