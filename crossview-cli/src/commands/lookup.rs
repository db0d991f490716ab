//! Lookup command - resolve a tile by id or by WGS84 point.

use clap::Args;
use crossview::geometry::to_wkt;

use super::common::CliContext;
use super::select::parse_tile_id;
use crate::error::CliError;

/// Arguments for the lookup command.
#[derive(Debug, Args)]
pub struct LookupArgs {
    /// Tile id (10/430/720 or 10-430-720)
    #[arg(long, conflicts_with_all = ["lon", "lat"])]
    pub tile_id: Option<String>,

    /// Longitude (WGS84)
    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    pub lon: Option<f64>,

    /// Latitude (WGS84)
    #[arg(long, requires = "lon", allow_hyphen_values = true)]
    pub lat: Option<f64>,

    /// Print the tile polygon as WKT
    #[arg(long)]
    pub wkt: bool,
}

/// Run the lookup command.
pub fn run(ctx: &CliContext, args: LookupArgs) -> Result<(), CliError> {
    let index = ctx.tile_index()?;

    let id = match (&args.tile_id, args.lon, args.lat) {
        (Some(id), _, _) => parse_tile_id(id)?,
        (None, Some(lon), Some(lat)) => index.lookup_by_lonlat(lon, lat)?,
        _ => {
            return Err(CliError::Config(
                "pass --tile-id or both --lon and --lat".to_string(),
            ))
        }
    };
    let tile = index.lookup_by_id(&id)?;

    println!("Tile:     {} ({})", tile.id.slash(), tile.id.dash());
    println!("CRS:      {}", tile.crs);
    println!(
        "Bounds:   [{:.2}, {:.2}, {:.2}, {:.2}]",
        tile.bounds.min_x, tile.bounds.min_y, tile.bounds.max_x, tile.bounds.max_y
    );
    let geo = tile.bounds.to_geographic(index.projection());
    println!(
        "WGS84:    [{:.6}, {:.6}, {:.6}, {:.6}]",
        geo.min_x, geo.min_y, geo.max_x, geo.max_y
    );
    if args.wkt {
        println!("Polygon:  {}", to_wkt(&tile.polygon.clone().into()));
    }
    for (name, url) in &tile.downloads {
        println!("Download: {} = {}", name, url);
    }
    println!("Data:     {}", ctx.layout.imagery_dir(&id).display());
    println!("EPSG:     {}", index.projection().epsg());
    Ok(())
}
