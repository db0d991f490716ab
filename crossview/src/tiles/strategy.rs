//! Ordered fallback strategies for tile ids and acquisition regions.
//!
//! Both are tried in priority order; the first strategy that produces a
//! value wins. Exhaustion is a typed "not found", never a swallowed error.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use super::{TileIndex, TileIndexError};
use crate::coord::TileId;
use crate::filter::{footprint_path, load_reference};
use crate::geometry::Bounds;

fn dash_id_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"/(\d+-\d+-\d+)(?:\.|/|$)").ok())
        .as_ref()
}

/// A way of recovering a tile id from an index entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdStrategy {
    /// The entry's `tile_id` field, in either encoding.
    Field,
    /// A dash id embedded in one of the entry's download URLs.
    DownloadUrl,
}

impl IdStrategy {
    /// Default resolution order.
    pub const DEFAULT_ORDER: [IdStrategy; 2] = [IdStrategy::Field, IdStrategy::DownloadUrl];

    /// Attempts to resolve an id from the raw entry fields.
    pub fn resolve(
        &self,
        field: Option<&str>,
        downloads: &BTreeMap<String, String>,
    ) -> Option<TileId> {
        match self {
            IdStrategy::Field => field.and_then(|s| TileId::parse(s).ok()),
            IdStrategy::DownloadUrl => {
                let pattern = dash_id_pattern()?;
                downloads.values().find_map(|url| {
                    pattern
                        .captures(url)
                        .and_then(|c| c.get(1))
                        .and_then(|m| TileId::parse(m.as_str()).ok())
                })
            }
        }
    }

    /// Tries each strategy in order.
    pub fn resolve_first(
        order: &[IdStrategy],
        field: Option<&str>,
        downloads: &BTreeMap<String, String>,
    ) -> Option<TileId> {
        order.iter().find_map(|s| s.resolve(field, downloads))
    }
}

/// A source for the acquisition region of a tile.
#[derive(Debug, Clone, PartialEq)]
pub enum RegionSource {
    /// The tile polygon from the index.
    IndexPolygon,
    /// The envelope of the tile's reference footprints.
    FootprintBounds {
        mesh_root: PathBuf,
        layers: Vec<String>,
    },
}

impl RegionSource {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            RegionSource::IndexPolygon => "index_polygon",
            RegionSource::FootprintBounds { .. } => "footprint_bounds",
        }
    }

    fn resolve(&self, index: &TileIndex, tile: &TileId) -> Option<Bounds> {
        match self {
            RegionSource::IndexPolygon => index.lookup_by_id(tile).ok().map(|t| t.bounds),
            RegionSource::FootprintBounds { mesh_root, layers } => {
                let path = footprint_path(mesh_root, tile);
                match load_reference(&path, layers) {
                    Ok(reference) => reference.bounds,
                    Err(e) => {
                        debug!(tile = %tile, error = %e, "Footprint region source unavailable");
                        None
                    }
                }
            }
        }
    }
}

/// Region chosen for a tile, in the index CRS.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRegion {
    /// Bounds including the margin.
    pub bounds: Bounds,
    /// Name of the source that produced it.
    pub source: &'static str,
}

impl TileIndex {
    /// Resolves the acquisition region from the index polygon only.
    pub fn resolve_region(
        &self,
        tile: &TileId,
        margin_m: f64,
    ) -> Result<ResolvedRegion, TileIndexError> {
        self.resolve_region_with(tile, margin_m, &[RegionSource::IndexPolygon])
    }

    /// Resolves the acquisition region, trying each source in order.
    pub fn resolve_region_with(
        &self,
        tile: &TileId,
        margin_m: f64,
        sources: &[RegionSource],
    ) -> Result<ResolvedRegion, TileIndexError> {
        for source in sources {
            if let Some(bounds) = source.resolve(self, tile) {
                debug!(tile = %tile, source = source.name(), "Resolved tile region");
                return Ok(ResolvedRegion {
                    bounds: bounds.expand(margin_m),
                    source: source.name(),
                });
            }
        }
        Err(TileIndexError::not_found(tile))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn downloads(urls: &[&str]) -> BTreeMap<String, String> {
        urls.iter()
            .enumerate()
            .map(|(i, u)| (format!("d{}", i), u.to_string()))
            .collect()
    }

    #[test]
    fn test_field_strategy_accepts_both_encodings() {
        let d = BTreeMap::new();
        assert_eq!(
            IdStrategy::Field.resolve(Some("10/430/720"), &d),
            Some(TileId::new(10, 430, 720))
        );
        assert_eq!(
            IdStrategy::Field.resolve(Some("10-430-720"), &d),
            Some(TileId::new(10, 430, 720))
        );
        assert_eq!(IdStrategy::Field.resolve(Some("nope"), &d), None);
    }

    #[test]
    fn test_download_url_strategy() {
        let d = downloads(&["https://example.com/3d/v1/10-430-720.zip"]);
        assert_eq!(
            IdStrategy::DownloadUrl.resolve(None, &d),
            Some(TileId::new(10, 430, 720))
        );

        let d = downloads(&["https://example.com/tiles/10-430-721/mesh.obj"]);
        assert_eq!(
            IdStrategy::DownloadUrl.resolve(None, &d),
            Some(TileId::new(10, 430, 721))
        );

        let d = downloads(&["https://example.com/tiles/v10-430-721x"]);
        assert_eq!(IdStrategy::DownloadUrl.resolve(None, &d), None);
    }

    #[test]
    fn test_region_falls_back_to_footprint_bounds() {
        let temp = tempfile::TempDir::new().unwrap();
        let tile = TileId::new(10, 430, 720);
        let path = footprint_path(temp.path(), &tile);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let footprints = r#"{
            "crs": "EPSG:28992",
            "layers": { "lod22_2d": ["POLYGON((100 200,110 200,110 220,100 220,100 200))"] }
        }"#;
        std::fs::write(&path, footprints).unwrap();

        let index = TileIndex::from_json(r#"{ "crs": "EPSG:28992", "tiles": [] }"#).unwrap();
        let sources = [
            RegionSource::IndexPolygon,
            RegionSource::FootprintBounds {
                mesh_root: temp.path().to_path_buf(),
                layers: vec!["lod22_2d".to_string()],
            },
        ];

        let region = index.resolve_region_with(&tile, 5.0, &sources).unwrap();
        assert_eq!(region.source, "footprint_bounds");
        assert_eq!(region.bounds, Bounds::new(95.0, 195.0, 115.0, 225.0));

        let missing = TileId::new(10, 1, 1);
        assert!(matches!(
            index.resolve_region_with(&missing, 5.0, &sources),
            Err(TileIndexError::NotFound(_))
        ));
    }

    #[test]
    fn test_first_strategy_wins() {
        let d = downloads(&["https://example.com/10-1-1.zip"]);
        let id = IdStrategy::resolve_first(&IdStrategy::DEFAULT_ORDER, Some("10/2/2"), &d);
        assert_eq!(id, Some(TileId::new(10, 2, 2)));

        let id = IdStrategy::resolve_first(&IdStrategy::DEFAULT_ORDER, Some("bad"), &d);
        assert_eq!(id, Some(TileId::new(10, 1, 1)));
    }
}
