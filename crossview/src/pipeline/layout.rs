//! On-disk layout of per-tile artifacts.
//!
//! ```text
//! <data_root>/
//! ├── tile_index.json
//! ├── mesh/<t>/<t>.footprints.json
//! ├── imagery/<t>/
//! │   ├── meta.jsonl
//! │   ├── acquire.done
//! │   ├── meta_projected.jsonl
//! │   ├── meta_annotated.jsonl
//! │   ├── meta_clean.jsonl
//! │   ├── images/  images_full/  images_clean/  images_full_clean/
//! └── processed/
//!     ├── <t>/tile.json
//!     ├── <t>/manifest.json
//!     └── index.json
//! ```
//!
//! `<t>` is always the dash encoding of the tile id.

use std::path::PathBuf;

use crate::acquisition::{AcquisitionTarget, AssetDirs};
use crate::coord::TileId;
use crate::filter::footprint_path;

/// Default data root.
pub const DEFAULT_DATA_ROOT: &str = "data/amsterdam";

/// Resolves every per-tile path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLayout {
    pub data_root: PathBuf,
    pub mesh_root: PathBuf,
    pub imagery_root: PathBuf,
    pub processed_root: PathBuf,
    pub tile_index: PathBuf,
}

impl Default for DataLayout {
    fn default() -> Self {
        Self::new(DEFAULT_DATA_ROOT)
    }
}

impl DataLayout {
    /// Layout with every root under `data_root`.
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        let data_root = data_root.into();
        Self {
            mesh_root: data_root.join("mesh"),
            imagery_root: data_root.join("imagery"),
            processed_root: data_root.join("processed"),
            tile_index: data_root.join("tile_index.json"),
            data_root,
        }
    }

    pub fn with_mesh_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.mesh_root = path.into();
        self
    }

    pub fn with_imagery_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.imagery_root = path.into();
        self
    }

    pub fn with_processed_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.processed_root = path.into();
        self
    }

    pub fn with_tile_index(mut self, path: impl Into<PathBuf>) -> Self {
        self.tile_index = path.into();
        self
    }

    pub fn imagery_dir(&self, tile: &TileId) -> PathBuf {
        self.imagery_root.join(tile.dash())
    }

    pub fn processed_dir(&self, tile: &TileId) -> PathBuf {
        self.processed_root.join(tile.dash())
    }

    pub fn footprints(&self, tile: &TileId) -> PathBuf {
        footprint_path(&self.mesh_root, tile)
    }

    /// Resolved tile descriptor.
    pub fn tile_descriptor(&self, tile: &TileId) -> PathBuf {
        self.processed_dir(tile).join("tile.json")
    }

    pub fn meta(&self, tile: &TileId) -> PathBuf {
        self.imagery_dir(tile).join("meta.jsonl")
    }

    /// Written once acquisition has nothing left to fetch.
    pub fn acquire_marker(&self, tile: &TileId) -> PathBuf {
        self.imagery_dir(tile).join("acquire.done")
    }

    pub fn meta_projected(&self, tile: &TileId) -> PathBuf {
        self.imagery_dir(tile).join("meta_projected.jsonl")
    }

    pub fn meta_annotated(&self, tile: &TileId) -> PathBuf {
        self.imagery_dir(tile).join("meta_annotated.jsonl")
    }

    pub fn meta_clean(&self, tile: &TileId) -> PathBuf {
        self.imagery_dir(tile).join("meta_clean.jsonl")
    }

    pub fn images(&self, tile: &TileId) -> PathBuf {
        self.imagery_dir(tile).join("images")
    }

    pub fn images_full(&self, tile: &TileId) -> PathBuf {
        self.imagery_dir(tile).join("images_full")
    }

    pub fn images_clean(&self, tile: &TileId) -> PathBuf {
        self.imagery_dir(tile).join("images_clean")
    }

    pub fn images_full_clean(&self, tile: &TileId) -> PathBuf {
        self.imagery_dir(tile).join("images_full_clean")
    }

    pub fn manifest(&self, tile: &TileId) -> PathBuf {
        self.processed_dir(tile).join("manifest.json")
    }

    /// Default location of the aggregated index.
    pub fn index(&self) -> PathBuf {
        self.processed_root.join("index.json")
    }

    /// Output locations for the acquisition engine.
    pub fn acquisition_target(&self, tile: &TileId) -> AcquisitionTarget {
        AcquisitionTarget {
            meta_path: self.meta(tile),
            assets: AssetDirs {
                images: self.images(tile),
                images_full: self.images_full(tile),
            },
        }
    }
}
