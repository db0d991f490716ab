//! Tile identifier types and errors.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when parsing tile identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordError {
    /// The string is not a `level/x/y` or `level-x-y` triple.
    #[error("invalid tile id '{0}': expected level/x/y or level-x-y")]
    InvalidTileId(String),
}

/// Identifier of a tile in the tile pyramid.
///
/// A tile is addressed by a `(level, x, y)` triple with two interchangeable
/// string encodings:
///
/// - canonical slash form: `10/430/720`
/// - filesystem-safe dash form: `10-430-720`
///
/// Both encodings parse to the same triple. Ordering is lexicographic on
/// `(level, x, y)`, which is also the tie-break used by point lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TileId {
    /// Pyramid level
    pub level: u8,
    /// Column
    pub x: u32,
    /// Row
    pub y: u32,
}

impl TileId {
    /// Creates a tile id from its components.
    pub const fn new(level: u8, x: u32, y: u32) -> Self {
        Self { level, x, y }
    }

    /// Parses either encoding.
    ///
    /// Surrounding whitespace is ignored. The separator must be used
    /// consistently: `10-430/720` is rejected.
    pub fn parse(s: &str) -> Result<Self, CoordError> {
        let trimmed = s.trim();
        let sep = if trimmed.contains('/') { '/' } else { '-' };
        let parts: Vec<&str> = trimmed.split(sep).collect();
        if parts.len() != 3 {
            return Err(CoordError::InvalidTileId(s.to_string()));
        }

        let invalid = || CoordError::InvalidTileId(s.to_string());
        let level = parts[0].parse::<u8>().map_err(|_| invalid())?;
        let x = parts[1].parse::<u32>().map_err(|_| invalid())?;
        let y = parts[2].parse::<u32>().map_err(|_| invalid())?;

        Ok(Self { level, x, y })
    }

    /// Canonical slash form, e.g. `10/430/720`.
    pub fn slash(&self) -> String {
        format!("{}/{}/{}", self.level, self.x, self.y)
    }

    /// Filesystem-safe dash form, e.g. `10-430-720`.
    ///
    /// Used for every directory and file name derived from a tile.
    pub fn dash(&self) -> String {
        format!("{}-{}-{}", self.level, self.x, self.y)
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.level, self.x, self.y)
    }
}

impl FromStr for TileId {
    type Err = CoordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TileId {
    type Error = CoordError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TileId> for String {
    fn from(id: TileId) -> Self {
        id.dash()
    }
}
