//! Resolved tile descriptor (`processed/<t>/tile.json`).

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PipelineError;
use crate::coord::TileId;
use crate::geometry::{to_wkt, Bounds};
use crate::store::write_atomic;
use crate::tiles::{ResolvedRegion, Tile};

/// What the resolve step learned about a tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileDescriptor {
    pub tile_id: TileId,
    pub tile_id_slash: String,
    pub crs: String,
    pub polygon_wkt: String,
    /// Tile polygon envelope in the tile CRS.
    pub bounds: Bounds,
    /// Acquisition region in the tile CRS, margin included.
    pub region: Bounds,
    pub region_source: String,
    pub margin_m: f64,
    /// Acquisition region as a WGS84 query box.
    pub query_bbox: Bounds,
    pub created_at: DateTime<Utc>,
}

impl TileDescriptor {
    pub fn new(tile: &Tile, region: &ResolvedRegion, margin_m: f64, query_bbox: Bounds) -> Self {
        Self {
            tile_id: tile.id,
            tile_id_slash: tile.id.slash(),
            crs: tile.crs.clone(),
            polygon_wkt: to_wkt(&tile.polygon.clone().into()),
            bounds: tile.bounds,
            region: region.bounds,
            region_source: region.source.to_string(),
            margin_m,
            query_bbox,
            created_at: Utc::now(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path).map_err(|e| PipelineError::Descriptor {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&text).map_err(|e| PipelineError::Descriptor {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), PipelineError> {
        let json = serde_json::to_vec_pretty(self).map_err(|e| PipelineError::Descriptor {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        write_atomic(path, &json)?;
        Ok(())
    }
}
