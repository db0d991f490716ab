//! Tile index and tile selection
//!
//! The [`TileIndex`] is loaded once from a `tile_index.json` file and passed
//! by reference to whoever needs spatial lookups. There is no global index.
//!
//! # File format
//!
//! ```text
//! {
//!   "crs": "EPSG:28992",
//!   "tiles": [
//!     {
//!       "tile_id": "10/430/720",
//!       "polygon": "POLYGON((...))",
//!       "downloads": { "obj": "https://.../10-430-720.zip" }
//!     }
//!   ]
//! }
//! ```
//!
//! An entry without a usable `tile_id` may still be indexed when one of its
//! download URLs embeds the dash id; see [`IdStrategy`].
//!
//! # Example
//!
//! ```ignore
//! use crossview::tiles::{Selection, TileIndex};
//!
//! let index = TileIndex::load("data/tile_index.json")?;
//! let tile = index.lookup_by_lonlat(4.8926, 52.3731)?;
//! let around = Selection::Neighbors { tile, k: 1 }.evaluate(&index)?;
//! ```

mod index;
mod select;
mod strategy;

pub use index::{Tile, TileIndex};
pub use select::{read_tile_list, write_tile_list, Selection, TILE_LIST_HEADER};
pub use strategy::{IdStrategy, RegionSource, ResolvedRegion};

use std::path::PathBuf;

use thiserror::Error;

use crate::coord::{CoordError, TileId};
use crate::geometry::GeometryError;

/// Errors from tile index loading, lookup and tile list handling.
#[derive(Debug, Error)]
pub enum TileIndexError {
    /// File could not be read or written.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Index file is not valid JSON of the expected shape.
    #[error("failed to parse tile index {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// The index CRS has no known projection.
    #[error("unsupported tile index CRS '{0}'")]
    UnsupportedCrs(String),

    /// No tile matched the id, point or region sources.
    #[error("tile not found: {0}")]
    NotFound(String),

    /// A tile list line does not hold a tile id.
    #[error("invalid tile list line {line}: '{content}'")]
    InvalidTileList { line: usize, content: String },

    /// A tile id could not be parsed.
    #[error(transparent)]
    Coord(#[from] CoordError),

    /// A selection geometry could not be parsed.
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

impl TileIndexError {
    pub(crate) fn not_found(tile: &TileId) -> Self {
        TileIndexError::NotFound(tile.to_string())
    }
}
