//! Tile coordinate module
//!
//! Provides the [`TileId`] triple with its slash and dash encodings, and
//! neighbourhood enumeration used by tile selection.

mod types;

pub use types::{CoordError, TileId};

impl TileId {
    /// Returns the Chebyshev ring of radius `k` around this tile.
    ///
    /// The result contains every tile at the same level whose column and row
    /// differ by at most `k`, including the tile itself: (2k+1)² entries
    /// away from the pyramid origin. Coordinates that would become negative
    /// are skipped. Entries are ordered row-major (by `y`, then `x`).
    pub fn ring(&self, k: u32) -> Vec<TileId> {
        let k = k as i64;
        let mut tiles = Vec::with_capacity(((2 * k + 1) * (2 * k + 1)) as usize);

        for dy in -k..=k {
            for dx in -k..=k {
                let x = self.x as i64 + dx;
                let y = self.y as i64 + dy;
                if x < 0 || y < 0 || x > u32::MAX as i64 || y > u32::MAX as i64 {
                    continue;
                }
                tiles.push(TileId::new(self.level, x as u32, y as u32));
            }
        }

        tiles
    }

    /// Chebyshev distance to another tile, or `None` across levels.
    pub fn chebyshev_distance(&self, other: &TileId) -> Option<u32> {
        if self.level != other.level {
            return None;
        }
        let dx = self.x.abs_diff(other.x);
        let dy = self.y.abs_diff(other.y);
        Some(dx.max(dy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_slash_form() {
        let tile = TileId::parse("10/430/720").unwrap();
        assert_eq!(tile, TileId::new(10, 430, 720));
    }

    #[test]
    fn test_parse_dash_form() {
        let tile = TileId::parse("10-430-720").unwrap();
        assert_eq!(tile, TileId::new(10, 430, 720));
    }

    #[test]
    fn test_both_encodings_parse_to_same_triple() {
        assert_eq!(
            TileId::parse("8/328/552").unwrap(),
            TileId::parse("8-328-552").unwrap()
        );
    }

    #[test]
    fn test_parse_trims_whitespace() {
        let tile = TileId::parse("  10-430-720\n").unwrap();
        assert_eq!(tile.dash(), "10-430-720");
    }

    #[test]
    fn test_parse_rejects_mixed_separators() {
        assert!(matches!(
            TileId::parse("10-430/720"),
            Err(CoordError::InvalidTileId(_))
        ));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(TileId::parse("").is_err());
        assert!(TileId::parse("10/430").is_err());
        assert!(TileId::parse("10/430/720/1").is_err());
        assert!(TileId::parse("a-b-c").is_err());
        assert!(TileId::parse("300-1-1").is_err(), "level must fit in u8");
        assert!(TileId::parse("10--5-3").is_err());
    }

    #[test]
    fn test_display_is_slash_form() {
        assert_eq!(TileId::new(10, 430, 720).to_string(), "10/430/720");
    }

    #[test]
    fn test_serde_uses_dash_form() {
        let json = serde_json::to_string(&TileId::new(10, 430, 720)).unwrap();
        assert_eq!(json, "\"10-430-720\"");

        let back: TileId = serde_json::from_str("\"10/430/720\"").unwrap();
        assert_eq!(back, TileId::new(10, 430, 720));
    }

    #[test]
    fn test_ordering_is_level_then_x_then_y() {
        let mut tiles = vec![
            TileId::new(10, 431, 0),
            TileId::new(9, 999, 999),
            TileId::new(10, 430, 721),
            TileId::new(10, 430, 720),
        ];
        tiles.sort();
        assert_eq!(
            tiles,
            vec![
                TileId::new(9, 999, 999),
                TileId::new(10, 430, 720),
                TileId::new(10, 430, 721),
                TileId::new(10, 431, 0),
            ]
        );
    }

    #[test]
    fn test_ring_zero_is_self() {
        let tile = TileId::new(10, 430, 720);
        assert_eq!(tile.ring(0), vec![tile]);
    }

    #[test]
    fn test_ring_one_is_three_by_three() {
        let tile = TileId::new(10, 430, 720);
        let ring = tile.ring(1);
        assert_eq!(ring.len(), 9);
        assert!(ring.contains(&TileId::new(10, 429, 719)));
        assert!(ring.contains(&TileId::new(10, 431, 721)));
        assert!(ring.iter().all(|t| t.chebyshev_distance(&tile) <= Some(1)));
    }

    #[test]
    fn test_ring_skips_negative_coordinates() {
        let ring = TileId::new(4, 0, 0).ring(1);
        assert_eq!(ring.len(), 4);
    }

    #[test]
    fn test_chebyshev_distance_across_levels() {
        let a = TileId::new(10, 0, 0);
        let b = TileId::new(11, 0, 0);
        assert_eq!(a.chebyshev_distance(&b), None);
        assert_eq!(a.chebyshev_distance(&TileId::new(10, 3, 1)), Some(3));
    }

    // Property-based tests using proptest
    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_encodings_roundtrip(level in 0u8..=30, x in 0u32..1_000_000, y in 0u32..1_000_000) {
                let tile = TileId::new(level, x, y);
                prop_assert_eq!(TileId::parse(&tile.slash())?, tile);
                prop_assert_eq!(TileId::parse(&tile.dash())?, tile);
                prop_assert_eq!(tile.slash().replace('/', "-"), tile.dash());
            }

            #[test]
            fn test_ring_size(x in 10u32..1000, y in 10u32..1000, k in 0u32..5) {
                let ring = TileId::new(12, x, y).ring(k);
                let side = (2 * k + 1) as usize;
                prop_assert_eq!(ring.len(), side * side);
            }
        }
    }
}
