//! In-memory tile index with R-tree acceleration.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use geo::{Area, Intersects};
use geo_types::{Geometry, Point, Polygon};
use rstar::{RTree, RTreeObject, AABB};
use serde::Deserialize;
use tracing::{info, warn};

use super::strategy::IdStrategy;
use super::TileIndexError;
use crate::coord::TileId;
use crate::crs::{projection_for, Projection};
use crate::geometry::{parse_wkt, repair_polygons, Bounds};

/// A tile loaded from the index. Immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    pub id: TileId,
    pub polygon: Polygon<f64>,
    pub bounds: Bounds,
    pub crs: String,
    pub downloads: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct IndexFile {
    crs: String,
    tiles: Vec<IndexEntry>,
}

#[derive(Debug, Deserialize)]
struct IndexEntry {
    #[serde(default)]
    tile_id: Option<String>,
    polygon: String,
    #[serde(default)]
    downloads: BTreeMap<String, String>,
}

#[derive(Clone)]
struct TileEnvelope {
    idx: usize,
    env: AABB<[f64; 2]>,
}

impl RTreeObject for TileEnvelope {
    type Envelope = AABB<[f64; 2]>;

    #[inline]
    fn envelope(&self) -> Self::Envelope {
        self.env
    }
}

fn envelope_of(b: &Bounds) -> AABB<[f64; 2]> {
    AABB::from_corners([b.min_x, b.min_y], [b.max_x, b.max_y])
}

/// Spatial lookup over tile polygons.
pub struct TileIndex {
    crs: String,
    projection: Box<dyn Projection>,
    tiles: Vec<Tile>,
    by_id: HashMap<TileId, usize>,
    tree: RTree<TileEnvelope>,
}

impl std::fmt::Debug for TileIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileIndex")
            .field("crs", &self.crs)
            .field("tiles", &self.tiles.len())
            .finish()
    }
}

impl TileIndex {
    /// Builds an index from already-parsed tiles.
    ///
    /// Duplicate ids keep the first tile.
    pub fn new(crs: impl Into<String>, tiles: Vec<Tile>) -> Result<Self, TileIndexError> {
        let crs = crs.into();
        let projection =
            projection_for(&crs).ok_or_else(|| TileIndexError::UnsupportedCrs(crs.clone()))?;

        let mut kept = Vec::with_capacity(tiles.len());
        let mut by_id = HashMap::with_capacity(tiles.len());
        for tile in tiles {
            if by_id.contains_key(&tile.id) {
                warn!(tile = %tile.id, "Duplicate tile id in index, keeping first");
                continue;
            }
            by_id.insert(tile.id, kept.len());
            kept.push(tile);
        }

        let envelopes = kept
            .iter()
            .enumerate()
            .map(|(idx, t)| TileEnvelope {
                idx,
                env: envelope_of(&t.bounds),
            })
            .collect();

        Ok(Self {
            crs,
            projection,
            tiles: kept,
            by_id,
            tree: RTree::bulk_load(envelopes),
        })
    }

    /// Loads a `tile_index.json` file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TileIndexError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| TileIndexError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let index = Self::from_json(&text).map_err(|e| match e {
            TileIndexError::Parse { message, .. } => TileIndexError::Parse {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })?;
        info!(path = %path.display(), tiles = index.len(), "Loaded tile index");
        Ok(index)
    }

    /// Parses index JSON.
    ///
    /// Entries whose id cannot be resolved or whose polygon is unusable are
    /// skipped with a warning.
    pub fn from_json(text: &str) -> Result<Self, TileIndexError> {
        let file: IndexFile = serde_json::from_str(text).map_err(|e| TileIndexError::Parse {
            path: Default::default(),
            message: e.to_string(),
        })?;

        let mut tiles = Vec::with_capacity(file.tiles.len());
        for (n, entry) in file.tiles.into_iter().enumerate() {
            let Some(id) = IdStrategy::resolve_first(
                &IdStrategy::DEFAULT_ORDER,
                entry.tile_id.as_deref(),
                &entry.downloads,
            ) else {
                warn!(entry = n, "Skipping index entry without a resolvable tile id");
                continue;
            };

            let Some(polygon) = tile_polygon(&entry.polygon) else {
                warn!(tile = %id, "Skipping index entry with unusable polygon");
                continue;
            };
            let Some(bounds) = Bounds::of_polygon(&polygon) else {
                continue;
            };

            tiles.push(Tile {
                id,
                polygon,
                bounds,
                crs: file.crs.clone(),
                downloads: entry.downloads,
            });
        }

        Self::new(file.crs, tiles)
    }

    /// CRS tag of every tile polygon.
    pub fn crs(&self) -> &str {
        &self.crs
    }

    /// Projection between WGS84 and the index CRS.
    pub fn projection(&self) -> &dyn Projection {
        self.projection.as_ref()
    }

    /// All tiles in load order.
    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn contains(&self, id: &TileId) -> bool {
        self.by_id.contains_key(id)
    }

    /// Returns the tile with the given id.
    pub fn lookup_by_id(&self, id: &TileId) -> Result<&Tile, TileIndexError> {
        self.by_id
            .get(id)
            .map(|&i| &self.tiles[i])
            .ok_or_else(|| TileIndexError::not_found(id))
    }

    /// Finds the tile containing a point in the index CRS.
    ///
    /// The hit test includes polygon boundaries. When several tiles match
    /// (shared edges or overlapping polygons) the smallest id wins.
    pub fn lookup_by_point(&self, x: f64, y: f64) -> Result<TileId, TileIndexError> {
        let point = Point::new(x, y);
        self.tree
            .locate_in_envelope_intersecting(&AABB::from_point([x, y]))
            .map(|e| &self.tiles[e.idx])
            .filter(|t| t.polygon.intersects(&point))
            .map(|t| t.id)
            .min()
            .ok_or_else(|| TileIndexError::NotFound(format!("point ({}, {})", x, y)))
    }

    /// Finds the tile containing a WGS84 position.
    pub fn lookup_by_lonlat(&self, lon: f64, lat: f64) -> Result<TileId, TileIndexError> {
        let (x, y) = self.projection.forward(lon, lat);
        self.lookup_by_point(x, y)
            .map_err(|_| TileIndexError::NotFound(format!("lon/lat ({}, {})", lon, lat)))
    }

    /// All tiles whose polygon intersects the region (index CRS).
    pub fn lookup_by_region(&self, region: &Geometry<f64>) -> BTreeSet<TileId> {
        let Some(bounds) = Bounds::of_geometry(region) else {
            return BTreeSet::new();
        };
        self.tree
            .locate_in_envelope_intersecting(&envelope_of(&bounds))
            .map(|e| &self.tiles[e.idx])
            .filter(|t| region.intersects(&t.polygon))
            .map(|t| t.id)
            .collect()
    }

    /// Indexed tiles within Chebyshev distance `k` of `center`.
    pub fn neighbors(&self, center: &TileId, k: u32) -> BTreeSet<TileId> {
        center
            .ring(k)
            .into_iter()
            .filter(|t| self.contains(t))
            .collect()
    }
}

/// Parses a tile polygon, keeping the largest part of multi-part input.
fn tile_polygon(text: &str) -> Option<Polygon<f64>> {
    let geometry = parse_wkt(text).ok()?;
    repair_polygons(geometry)
        .parts
        .into_iter()
        .max_by(|a, b| a.unsigned_area().total_cmp(&b.unsigned_area()))
}
