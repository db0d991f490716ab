//! Listing query construction.

use reqwest::Url;

use super::types::{Continuation, ProviderError};
use crate::geometry::Bounds;

/// Default listing endpoint.
pub const DEFAULT_BASE_URL: &str = "https://graph.mapillary.com/images";

/// Default page size.
pub const DEFAULT_PAGE_SIZE: u32 = 200;

/// Fields requested for every image.
pub const DEFAULT_FIELDS: &[&str] = &[
    "id",
    "captured_at",
    "camera_type",
    "compass_angle",
    "altitude",
    "computed_geometry",
    "geometry",
    "sequence",
    "thumb_256_url",
    "thumb_1024_url",
    "thumb_2048_url",
];

/// A bounding-box listing query for one cell.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageQuery {
    base_url: String,
    bbox: Bounds,
    limit: u32,
    fields: Vec<String>,
}

impl ImageQuery {
    /// Creates a query for a WGS84 bounding box.
    pub fn new(base_url: impl Into<String>, bbox: Bounds) -> Self {
        Self {
            base_url: base_url.into(),
            bbox,
            limit: DEFAULT_PAGE_SIZE,
            fields: DEFAULT_FIELDS.iter().map(|f| f.to_string()).collect(),
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit.max(1);
        self
    }

    pub fn with_fields(mut self, fields: &[&str]) -> Self {
        self.fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn bbox(&self) -> Bounds {
        self.bbox
    }

    /// URL of the first page, or of the page after `after`.
    pub fn url(&self, after: Option<&str>) -> Result<String, ProviderError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ProviderError::HttpError(format!("invalid base URL: {}", e)))?;
        {
            let mut q = url.query_pairs_mut();
            q.append_pair(
                "bbox",
                &format!(
                    "{},{},{},{}",
                    self.bbox.min_x, self.bbox.min_y, self.bbox.max_x, self.bbox.max_y
                ),
            );
            q.append_pair("fields", &self.fields.join(","));
            q.append_pair("image_type", "photo");
            q.append_pair("limit", &self.limit.to_string());
            if let Some(after) = after {
                q.append_pair("after", after);
            }
        }
        Ok(url.to_string())
    }

    /// URL for a continuation returned by the previous page.
    pub fn continue_with(&self, continuation: &Continuation) -> Result<String, ProviderError> {
        match continuation {
            Continuation::After(cursor) => self.url(Some(cursor)),
            Continuation::Next(next) => Ok(next.clone()),
        }
    }
}
