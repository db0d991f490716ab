//! Working-set selection and tile list files.

use std::collections::BTreeSet;
use std::f64::consts::PI;
use std::fmt::Write as _;
use std::path::Path;

use geo::MapCoords;
use geo_types::{coord, Geometry, LineString, Polygon};
use tracing::info;

use super::{TileIndex, TileIndexError};
use crate::coord::TileId;
use crate::geometry::parse_wkt;

/// Header written at the top of tile list files.
pub const TILE_LIST_HEADER: &str = "tile_id_dash,tile_id_slash";

/// Column names recognised when reading tile lists, in preference order.
const ID_COLUMNS: [&str; 5] = ["tile_id_dash", "tile_id", "dash", "id", "tile_id_slash"];

/// Vertices used to approximate a search circle.
const CIRCLE_SEGMENTS: usize = 64;

/// Points inserted along each edge of a geographic box before projecting.
const EDGE_DENSIFY: usize = 8;

/// How to choose a working set of tiles from the index.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// Tiles within Chebyshev distance `k` of `tile`.
    Neighbors { tile: TileId, k: u32 },
    /// Tiles intersecting a circle around a WGS84 point.
    AroundPoint { lon: f64, lat: f64, radius_m: f64 },
    /// Tiles intersecting a WGS84 bounding box.
    BBox {
        min_lon: f64,
        min_lat: f64,
        max_lon: f64,
        max_lat: f64,
    },
    /// Tiles intersecting a WGS84 polygon given as WKT.
    Polygon(String),
}

impl Selection {
    /// Evaluates the selection, returning sorted unique ids.
    pub fn evaluate(&self, index: &TileIndex) -> Result<Vec<TileId>, TileIndexError> {
        let projection = index.projection();

        let ids: BTreeSet<TileId> = match self {
            Selection::Neighbors { tile, k } => index.neighbors(tile, *k),
            Selection::AroundPoint { lon, lat, radius_m } => {
                let (cx, cy) = projection.forward(*lon, *lat);
                let ring: Vec<_> = (0..CIRCLE_SEGMENTS)
                    .map(|i| {
                        let a = 2.0 * PI * i as f64 / CIRCLE_SEGMENTS as f64;
                        coord! { x: cx + radius_m * a.cos(), y: cy + radius_m * a.sin() }
                    })
                    .collect();
                let circle = Polygon::new(LineString::from(ring), vec![]);
                index.lookup_by_region(&Geometry::Polygon(circle))
            }
            Selection::BBox {
                min_lon,
                min_lat,
                max_lon,
                max_lat,
            } => {
                let ring = densified_box(*min_lon, *min_lat, *max_lon, *max_lat)
                    .into_iter()
                    .map(|(lon, lat)| {
                        let (x, y) = projection.forward(lon, lat);
                        coord! { x: x, y: y }
                    })
                    .collect::<Vec<_>>();
                let region = Polygon::new(LineString::from(ring), vec![]);
                index.lookup_by_region(&Geometry::Polygon(region))
            }
            Selection::Polygon(wkt) => {
                let geographic = parse_wkt(wkt)?;
                let projected = geographic.map_coords(|c| {
                    let (x, y) = projection.forward(c.x, c.y);
                    coord! { x: x, y: y }
                });
                index.lookup_by_region(&projected)
            }
        };

        info!(selected = ids.len(), "Evaluated tile selection");
        Ok(ids.into_iter().collect())
    }
}

fn densified_box(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Vec<(f64, f64)> {
    let corners = [
        (min_lon, min_lat),
        (max_lon, min_lat),
        (max_lon, max_lat),
        (min_lon, max_lat),
    ];
    let mut ring = Vec::with_capacity(4 * EDGE_DENSIFY + 1);
    for i in 0..4 {
        let (x0, y0) = corners[i];
        let (x1, y1) = corners[(i + 1) % 4];
        for s in 0..EDGE_DENSIFY {
            let t = s as f64 / EDGE_DENSIFY as f64;
            ring.push((x0 + (x1 - x0) * t, y0 + (y1 - y0) * t));
        }
    }
    ring.push(corners[0]);
    ring
}

/// Writes a tile list CSV with both encodings.
pub fn write_tile_list(path: impl AsRef<Path>, tiles: &[TileId]) -> Result<(), TileIndexError> {
    let path = path.as_ref();
    let mut out = String::with_capacity(24 * (tiles.len() + 1));
    out.push_str(TILE_LIST_HEADER);
    out.push('\n');
    for tile in tiles {
        let _ = writeln!(out, "{},{}", tile.dash(), tile.slash());
    }

    let io_err = |source| TileIndexError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(path, out).map_err(io_err)?;

    info!(path = %path.display(), tiles = tiles.len(), "Wrote tile list");
    Ok(())
}

/// Reads a tile list.
///
/// Accepts a CSV with a header naming one of the known id columns, or a
/// bare file with one id per line. Blank lines are ignored and repeated
/// ids keep their first position.
pub fn read_tile_list(path: impl AsRef<Path>) -> Result<Vec<TileId>, TileIndexError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| TileIndexError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_tile_list(&text)
}

fn parse_tile_list(text: &str) -> Result<Vec<TileId>, TileIndexError> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(n, l)| (n + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty())
        .peekable();

    let mut column = 0;
    if let Some(&(_, first)) = lines.peek() {
        let header: Vec<&str> = first.split(',').map(|c| c.trim()).collect();
        let first_is_id = header.first().is_some_and(|c| TileId::parse(c).is_ok());
        if !first_is_id {
            column = ID_COLUMNS
                .iter()
                .find_map(|name| header.iter().position(|c| c == name))
                .ok_or_else(|| TileIndexError::InvalidTileList {
                    line: 1,
                    content: first.to_string(),
                })?;
            lines.next();
        }
    }

    let mut seen = BTreeSet::new();
    let mut tiles = Vec::new();
    for (line, content) in lines {
        let id = content
            .split(',')
            .nth(column)
            .and_then(|c| TileId::parse(c).ok())
            .ok_or_else(|| TileIndexError::InvalidTileList {
                line,
                content: content.to_string(),
            })?;
        if seen.insert(id) {
            tiles.push(id);
        }
    }
    Ok(tiles)
}
