//! Reference footprint loading.
//!
//! A tile's reference geometries live next to its mesh as
//! `<mesh_root>/<tile>/<tile>.footprints.json`:
//!
//! ```text
//! { "crs": "EPSG:28992",
//!   "layers": { "lod22_2d": ["POLYGON ((...))", ...], "lod13_2d": [...] } }
//! ```
//!
//! Layers are tried in priority order; the first one that exists and still
//! has at least one usable polygon after repair wins.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use geo_types::Polygon;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::coord::TileId;
use crate::geometry::{parse_wkt, repair_polygons, Bounds, RepairOutcome};

/// Default layer priority.
pub const DEFAULT_LAYERS: [&str; 3] = ["lod22_2d", "lod13_2d", "lod12_2d"];

/// Errors loading reference footprints.
#[derive(Debug, Error)]
pub enum FootprintError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("no usable layer in {path} (tried {tried:?}, available {available:?})")]
    NoUsableLayer {
        path: PathBuf,
        tried: Vec<String>,
        available: Vec<String>,
    },
}

#[derive(Debug, Deserialize)]
struct FootprintFile {
    #[serde(default)]
    crs: Option<String>,
    #[serde(default)]
    layers: BTreeMap<String, Vec<String>>,
}

/// Repaired reference geometries for one tile.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceSet {
    pub path: PathBuf,
    pub crs: Option<String>,
    /// Layer the polygons came from.
    pub layer: String,
    /// Every layer present in the file.
    pub layers: Vec<String>,
    pub polygons: Vec<Polygon<f64>>,
    /// Parts discarded during repair.
    pub dropped: usize,
    /// Envelope of `polygons`.
    pub bounds: Option<Bounds>,
}

/// Location of a tile's footprint file.
pub fn footprint_path(mesh_root: &Path, tile: &TileId) -> PathBuf {
    let dash = tile.dash();
    mesh_root.join(&dash).join(format!("{}.footprints.json", dash))
}

/// Loads and repairs the first usable layer of a footprint file.
pub fn load_reference(path: &Path, layers: &[String]) -> Result<ReferenceSet, FootprintError> {
    let text = std::fs::read_to_string(path).map_err(|e| FootprintError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let file: FootprintFile = serde_json::from_str(&text).map_err(|e| FootprintError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    let available: Vec<String> = file.layers.keys().cloned().collect();

    for layer in layers {
        let Some(wkts) = file.layers.get(layer) else {
            continue;
        };
        let outcome = repair_layer(wkts);
        if outcome.parts.is_empty() {
            warn!(path = %path.display(), layer = %layer, dropped = outcome.dropped, "Layer has no usable geometry");
            continue;
        }

        let bounds = outcome
            .parts
            .iter()
            .filter_map(Bounds::of_polygon)
            .reduce(|a, b| a.union(&b));
        debug!(
            path = %path.display(),
            layer = %layer,
            polygons = outcome.parts.len(),
            dropped = outcome.dropped,
            "Loaded reference footprints"
        );
        return Ok(ReferenceSet {
            path: path.to_path_buf(),
            crs: file.crs,
            layer: layer.clone(),
            layers: available,
            polygons: outcome.parts,
            dropped: outcome.dropped,
            bounds,
        });
    }

    Err(FootprintError::NoUsableLayer {
        path: path.to_path_buf(),
        tried: layers.to_vec(),
        available,
    })
}

fn repair_layer(wkts: &[String]) -> RepairOutcome {
    let mut outcome = RepairOutcome::default();
    for wkt in wkts {
        match parse_wkt(wkt) {
            Ok(geometry) => outcome.extend(repair_polygons(geometry)),
            Err(e) => {
                debug!(error = %e, "Skipping unparseable footprint");
                outcome.dropped += 1;
            }
        }
    }
    outcome
}
