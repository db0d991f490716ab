//! Coordinate reference systems
//!
//! All planar work (subdivision margins, containment, nearest distances) is
//! done in the tile's projected CRS. Geographic coordinates only appear at
//! the edges: remote queries take a WGS84 bounding box and records arrive
//! with longitude/latitude.
//!
//! The [`Projection`] trait is the single seam through which coordinates
//! cross between the two. Production data uses [`RdNew`] (EPSG:28992).

mod rd;

pub use rd::RdNew;

use crate::geometry::Bounds;

/// EPSG code for WGS84 geographic coordinates.
pub const EPSG_WGS84: u32 = 4326;

/// EPSG code for the Dutch national grid (Amersfoort / RD New).
pub const EPSG_RD_NEW: u32 = 28992;

/// Transform between WGS84 longitude/latitude and a planar CRS.
pub trait Projection: Send + Sync {
    /// Projects WGS84 `(lon, lat)` degrees to planar `(x, y)`.
    fn forward(&self, lon: f64, lat: f64) -> (f64, f64);

    /// Converts planar `(x, y)` back to WGS84 `(lon, lat)` degrees.
    fn inverse(&self, x: f64, y: f64) -> (f64, f64);

    /// EPSG code of the planar side.
    fn epsg(&self) -> u32;

    /// CRS tag as written to artifacts, e.g. `EPSG:28992`.
    fn crs_tag(&self) -> String {
        format!("EPSG:{}", self.epsg())
    }
}

/// Pass-through projection for data that is already geographic.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Projection for Identity {
    fn forward(&self, lon: f64, lat: f64) -> (f64, f64) {
        (lon, lat)
    }

    fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        (x, y)
    }

    fn epsg(&self) -> u32 {
        EPSG_WGS84
    }
}

/// Returns the projection for a CRS tag such as `EPSG:28992`.
///
/// Unknown tags yield `None`.
pub fn projection_for(tag: &str) -> Option<Box<dyn Projection>> {
    let code = tag
        .trim()
        .to_ascii_uppercase()
        .strip_prefix("EPSG:")
        .and_then(|c| c.parse::<u32>().ok())?;

    match code {
        EPSG_RD_NEW => Some(Box::new(RdNew)),
        EPSG_WGS84 => Some(Box::new(Identity)),
        _ => None,
    }
}

impl Bounds {
    /// Converts planar bounds to a geographic envelope.
    ///
    /// All four corners are transformed and the envelope of the results is
    /// taken, since a projected rectangle is not a rectangle in lon/lat.
    pub fn to_geographic(&self, projection: &dyn Projection) -> Bounds {
        let corners = [
            projection.inverse(self.min_x, self.min_y),
            projection.inverse(self.max_x, self.min_y),
            projection.inverse(self.min_x, self.max_y),
            projection.inverse(self.max_x, self.max_y),
        ];

        let mut out = Bounds::from_point(corners[0].0, corners[0].1);
        for (lon, lat) in &corners[1..] {
            out = out.union(&Bounds::from_point(*lon, *lat));
        }
        out
    }
}
