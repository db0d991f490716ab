//! WKT conversion.

use std::str::FromStr;

use geo_types::Geometry;
use wkt::ToWkt;

use super::GeometryError;

/// Parses WKT text into a `geo_types` geometry.
pub fn parse_wkt(text: &str) -> Result<Geometry<f64>, GeometryError> {
    wkt::Wkt::<f64>::from_str(text.trim())
        .map_err(|e| GeometryError::InvalidWkt(e.to_string()))
        .and_then(|w| {
            w.try_into()
                .map_err(|e: wkt::conversion::Error| GeometryError::InvalidWkt(format!("{:?}", e)))
        })
}

/// Formats a geometry as WKT.
pub fn to_wkt(geometry: &Geometry<f64>) -> String {
    geometry.wkt_string()
}
