//! Amersfoort / RD New (EPSG:28992).
//!
//! Uses the published polynomial approximation between RD and WGS84, which
//! is accurate to about a metre inside the Netherlands. Outside the
//! country the error grows quickly; tiles are never that far out.

use super::{Projection, EPSG_RD_NEW};

/// False easting of the RD origin (Amersfoort).
const X0: f64 = 155_000.0;
/// False northing of the RD origin.
const Y0: f64 = 463_000.0;
/// WGS84 latitude of the origin in degrees.
const PHI0: f64 = 52.155_174_40;
/// WGS84 longitude of the origin in degrees.
const LAM0: f64 = 5.387_206_21;

// (p, q, coefficient) terms, indexed by powers of dX and dY.
const K: [(i32, i32, f64); 11] = [
    (0, 1, 3235.653_89),
    (2, 0, -32.582_97),
    (0, 2, -0.247_50),
    (2, 1, -0.849_78),
    (0, 3, -0.065_50),
    (2, 2, -0.017_09),
    (1, 0, -0.007_38),
    (4, 0, 0.005_30),
    (2, 3, -0.000_39),
    (4, 1, 0.000_33),
    (1, 1, -0.000_12),
];

const L: [(i32, i32, f64); 12] = [
    (1, 0, 5260.529_16),
    (1, 1, 105.946_84),
    (1, 2, 2.456_56),
    (3, 0, -0.818_85),
    (1, 3, 0.055_94),
    (3, 1, -0.056_07),
    (0, 1, 0.011_99),
    (3, 2, -0.002_56),
    (1, 4, 0.001_28),
    (0, 2, 0.000_22),
    (2, 0, -0.000_22),
    (5, 0, 0.000_26),
];

// (p, q, coefficient) terms, indexed by powers of dPhi and dLam.
const R: [(i32, i32, f64); 9] = [
    (0, 1, 190_094.945),
    (1, 1, -11_832.228),
    (2, 1, -114.221),
    (0, 3, -32.391),
    (1, 0, -0.705),
    (3, 1, -2.340),
    (1, 3, -0.608),
    (0, 2, -0.008),
    (2, 3, 0.148),
];

const S: [(i32, i32, f64); 10] = [
    (1, 0, 309_056.544),
    (0, 2, 3638.893),
    (2, 0, 73.077),
    (1, 2, -157.984),
    (3, 0, -59.788),
    (0, 1, 0.433),
    (2, 2, -6.439),
    (1, 1, -0.032),
    (0, 4, 0.092),
    (1, 4, -0.054),
];

fn poly(terms: &[(i32, i32, f64)], a: f64, b: f64) -> f64 {
    terms
        .iter()
        .map(|&(p, q, c)| c * a.powi(p) * b.powi(q))
        .sum()
}

/// Dutch national grid projection.
#[derive(Debug, Clone, Copy, Default)]
pub struct RdNew;

impl Projection for RdNew {
    fn forward(&self, lon: f64, lat: f64) -> (f64, f64) {
        let d_phi = 0.36 * (lat - PHI0);
        let d_lam = 0.36 * (lon - LAM0);
        let x = X0 + poly(&R, d_phi, d_lam);
        let y = Y0 + poly(&S, d_phi, d_lam);
        (x, y)
    }

    fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let dx = (x - X0) * 1e-5;
        let dy = (y - Y0) * 1e-5;
        let lat = PHI0 + poly(&K, dx, dy) / 3600.0;
        let lon = LAM0 + poly(&L, dx, dy) / 3600.0;
        (lon, lat)
    }

    fn epsg(&self) -> u32 {
        EPSG_RD_NEW
    }
}
