//! Record schema
//!
//! A [`Record`] is one image's metadata as persisted in `meta.jsonl`. Every
//! optional attribute is an explicit `Option`; the shape of remote items is
//! validated once, in [`Record::from_api`], and anything that cannot form a
//! record is rejected there with a [`RejectReason`].
//!
//! Later steps wrap the record rather than mutate it:
//!
//! ```text
//! Record ──derive──► ProjectedRecord ──filter──► AnnotatedRecord
//!                    (+ x, y, UTC time)           (+ inside, distance, clean)
//! ```

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::coord::TileId;
use crate::provider::{ApiItem, FlexId, SequenceRef};

/// Source name recorded for items from the listing API.
pub const SOURCE_MAPILLARY: &str = "mapillary";

/// Thumbnail sizes offered by the listing API, ascending.
pub const THUMB_SIZES: [u32; 3] = [256, 1024, 2048];

/// Why a remote item could not become a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The item is not an object of the expected shape.
    Malformed,
    /// No usable id.
    MissingId,
    /// The id is not a plain token and cannot name a file.
    InvalidId,
    /// No usable position.
    MissingPosition,
    /// Position outside the valid longitude/latitude range.
    InvalidPosition,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RejectReason::Malformed => "malformed item",
            RejectReason::MissingId => "missing id",
            RejectReason::InvalidId => "invalid id",
            RejectReason::MissingPosition => "missing position",
            RejectReason::InvalidPosition => "invalid position",
        };
        f.write_str(s)
    }
}

/// Longest id accepted from the listing API.
pub const MAX_ID_LEN: usize = 128;

/// True when `id` is a non-empty token of ASCII letters, digits, `_` or
/// `-`. Ids name image files, so nothing else may reach the filesystem.
pub fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// One image's metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub lon: f64,
    pub lat: f64,
    /// Capture time in milliseconds since the Unix epoch.
    pub captured_at: Option<i64>,
    pub camera_type: Option<String>,
    pub compass_angle: Option<f64>,
    pub altitude: Option<f64>,
    pub sequence_id: Option<String>,
    pub thumb_256_url: Option<String>,
    pub thumb_1024_url: Option<String>,
    pub thumb_2048_url: Option<String>,
    /// Size of the viewer thumbnail saved under `images/`.
    pub thumb_saved_size: Option<u32>,
    /// Size of the training image saved under `images_full/`.
    pub full_saved_size: Option<u32>,
    pub tile_id: TileId,
    pub source: String,
}

impl Record {
    /// Validates a raw listing item.
    pub fn from_api(
        item: &serde_json::Value,
        tile: TileId,
        source: &str,
    ) -> Result<Record, RejectReason> {
        let item: ApiItem =
            serde_json::from_value(item.clone()).map_err(|_| RejectReason::Malformed)?;
        Self::from_item(item, tile, source)
    }

    /// Validates an already-decoded listing item.
    pub fn from_item(item: ApiItem, tile: TileId, source: &str) -> Result<Record, RejectReason> {
        let id = item
            .id
            .and_then(FlexId::into_string)
            .ok_or(RejectReason::MissingId)?;
        if !is_safe_id(&id) {
            return Err(RejectReason::InvalidId);
        }

        let (lon, lat) = item
            .computed_geometry
            .as_ref()
            .and_then(|g| g.lon_lat())
            .or_else(|| item.geometry.as_ref().and_then(|g| g.lon_lat()))
            .ok_or(RejectReason::MissingPosition)?;
        if !(-180.0..=180.0).contains(&lon) || !(-90.0..=90.0).contains(&lat) {
            return Err(RejectReason::InvalidPosition);
        }

        Ok(Record {
            id,
            lon,
            lat,
            captured_at: item
                .captured_at
                .filter(|t| t.is_finite())
                .map(|t| t as i64),
            camera_type: item.camera_type.filter(|c| !c.is_empty()),
            compass_angle: item.compass_angle.filter(|v| v.is_finite()),
            altitude: item.altitude.filter(|v| v.is_finite()),
            sequence_id: item.sequence.and_then(SequenceRef::into_id),
            thumb_256_url: item.thumb_256_url.filter(|u| !u.is_empty()),
            thumb_1024_url: item.thumb_1024_url.filter(|u| !u.is_empty()),
            thumb_2048_url: item.thumb_2048_url.filter(|u| !u.is_empty()),
            thumb_saved_size: None,
            full_saved_size: None,
            tile_id: tile,
            source: source.to_string(),
        })
    }

    fn thumb_url(&self, size: u32) -> Option<&str> {
        match size {
            256 => self.thumb_256_url.as_deref(),
            1024 => self.thumb_1024_url.as_deref(),
            2048 => self.thumb_2048_url.as_deref(),
            _ => None,
        }
    }

    /// Picks the largest thumbnail no bigger than `target`, else the
    /// smallest one available.
    pub fn pick_thumb(&self, target: u32) -> Option<&str> {
        THUMB_SIZES
            .iter()
            .rev()
            .filter(|&&s| s <= target)
            .find_map(|&s| self.thumb_url(s))
            .or_else(|| THUMB_SIZES.iter().find_map(|&s| self.thumb_url(s)))
    }

    /// Capture time as UTC, if known and representable.
    pub fn captured_at_utc(&self) -> Option<DateTime<Utc>> {
        self.captured_at
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
    }

    /// Case-insensitive substring match on the camera type.
    pub fn matches_device(&self, filter: &str) -> bool {
        let needle = filter.to_lowercase();
        self.camera_type
            .as_deref()
            .is_some_and(|c| c.to_lowercase().contains(&needle))
    }
}

/// A record with coordinates in the tile CRS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedRecord {
    #[serde(flatten)]
    pub record: Record,
    pub x: f64,
    pub y: f64,
    pub captured_at_utc: Option<DateTime<Utc>>,
}

/// A projected record classified against the tile and reference geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedRecord {
    #[serde(flatten)]
    pub projected: ProjectedRecord,
    pub inside_tile: bool,
    /// Distance to the nearest reference geometry, `None` without any.
    pub dist_to_ref_m: Option<f64>,
    pub is_clean: bool,
}

impl AnnotatedRecord {
    pub fn id(&self) -> &str {
        &self.projected.record.id
    }
}
