//! Select command - choose a working set of tiles from the index.

use std::path::PathBuf;

use clap::{Args, Subcommand};
use crossview::coord::TileId;
use crossview::tiles::{write_tile_list, Selection};

use super::common::CliContext;
use crate::error::CliError;

/// Arguments for the select command.
#[derive(Debug, Args)]
pub struct SelectArgs {
    #[command(subcommand)]
    pub mode: SelectMode,

    /// Write the tile list CSV here (prints to stdout when omitted)
    #[arg(long, global = true)]
    pub out: Option<PathBuf>,
}

/// Selection modes.
#[derive(Debug, Subcommand)]
pub enum SelectMode {
    /// Tiles within K steps of a center tile
    Neighbors {
        /// Center tile (10/430/720 or 10-430-720)
        #[arg(long)]
        tile_id: String,
        /// Ring radius in tiles
        #[arg(long, default_value_t = 1)]
        k: u32,
    },
    /// Tiles intersecting a circle around a WGS84 point
    AroundPoint {
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        /// Radius in meters
        #[arg(long, default_value_t = 500.0)]
        radius_m: f64,
    },
    /// Tiles intersecting a WGS84 bounding box
    Bbox {
        #[arg(long, allow_hyphen_values = true)]
        min_lon: f64,
        #[arg(long, allow_hyphen_values = true)]
        min_lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        max_lon: f64,
        #[arg(long, allow_hyphen_values = true)]
        max_lat: f64,
    },
    /// Tiles intersecting a WGS84 polygon
    Polygon {
        /// Polygon as WKT
        #[arg(long)]
        wkt: String,
    },
}

impl SelectMode {
    fn to_selection(&self) -> Result<Selection, CliError> {
        Ok(match self {
            SelectMode::Neighbors { tile_id, k } => Selection::Neighbors {
                tile: parse_tile_id(tile_id)?,
                k: *k,
            },
            SelectMode::AroundPoint { lon, lat, radius_m } => {
                if *radius_m <= 0.0 {
                    return Err(CliError::Config("--radius-m must be positive".to_string()));
                }
                Selection::AroundPoint {
                    lon: *lon,
                    lat: *lat,
                    radius_m: *radius_m,
                }
            }
            SelectMode::Bbox {
                min_lon,
                min_lat,
                max_lon,
                max_lat,
            } => {
                if min_lon >= max_lon || min_lat >= max_lat {
                    return Err(CliError::Config(
                        "bbox minimum must be below maximum".to_string(),
                    ));
                }
                Selection::BBox {
                    min_lon: *min_lon,
                    min_lat: *min_lat,
                    max_lon: *max_lon,
                    max_lat: *max_lat,
                }
            }
            SelectMode::Polygon { wkt } => Selection::Polygon(wkt.clone()),
        })
    }
}

/// Parses a tile id flag value.
pub fn parse_tile_id(s: &str) -> Result<TileId, CliError> {
    TileId::parse(s).map_err(|e| CliError::Config(e.to_string()))
}

/// Run the select command.
pub fn run(ctx: &CliContext, args: SelectArgs) -> Result<(), CliError> {
    let selection = args.mode.to_selection()?;
    let index = ctx.tile_index()?;
    let tiles = selection.evaluate(&index)?;

    match &args.out {
        Some(path) => {
            write_tile_list(path, &tiles)?;
            println!("Selected {} tiles -> {}", tiles.len(), path.display());
        }
        None => {
            println!("tile_id_dash,tile_id_slash");
            for tile in &tiles {
                println!("{},{}", tile.dash(), tile.slash());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neighbors_selection() {
        let mode = SelectMode::Neighbors {
            tile_id: "10-430-720".to_string(),
            k: 2,
        };
        assert_eq!(
            mode.to_selection().unwrap(),
            Selection::Neighbors {
                tile: TileId::new(10, 430, 720),
                k: 2
            }
        );
    }

    #[test]
    fn test_invalid_inputs_are_config_errors() {
        let bad_id = SelectMode::Neighbors {
            tile_id: "10_430".to_string(),
            k: 1,
        };
        assert!(matches!(bad_id.to_selection(), Err(CliError::Config(_))));

        let inverted = SelectMode::Bbox {
            min_lon: 5.0,
            min_lat: 52.0,
            max_lon: 4.0,
            max_lat: 53.0,
        };
        assert!(matches!(inverted.to_selection(), Err(CliError::Config(_))));
    }
}
