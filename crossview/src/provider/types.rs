//! Provider errors and wire types.

use serde::Deserialize;
use thiserror::Error;

/// How the acquisition engine should react to a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Worth retrying after a backoff.
    Transient,
    /// The server asked us to slow down; retried like `Transient`.
    RateLimited,
    /// The credential was rejected. Retrying cannot help.
    Unauthorized,
    /// Non-retryable request failure.
    Permanent,
}

impl FailureKind {
    /// True for failures that back off and retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureKind::Transient | FailureKind::RateLimited)
    }
}

/// Errors that can occur when talking to the remote API.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    /// Non-success HTTP status.
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// Request timed out.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Connection could not be established or was dropped.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Client construction or other request failure.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Body could not be decoded.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Classifies the failure for the retry loop.
    pub fn kind(&self) -> FailureKind {
        match self {
            ProviderError::Status { status, .. } => match status {
                429 => FailureKind::RateLimited,
                400 | 408 | 500 | 502 | 503 | 504 => FailureKind::Transient,
                401 | 403 => FailureKind::Unauthorized,
                _ => FailureKind::Permanent,
            },
            ProviderError::Timeout(_) | ProviderError::Connection(_) => FailureKind::Transient,
            ProviderError::HttpError(_) | ProviderError::InvalidResponse(_) => {
                FailureKind::Permanent
            }
        }
    }
}

/// One page of a paginated listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiPage {
    /// Raw items; each is validated separately at ingestion.
    #[serde(default)]
    pub data: Vec<serde_json::Value>,
    #[serde(default)]
    pub paging: Option<Paging>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Paging {
    #[serde(default)]
    pub cursors: Option<Cursors>,
    /// Absolute URL of the next page.
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Cursors {
    #[serde(default)]
    pub after: Option<String>,
}

/// How to request the page after this one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Continuation {
    /// Re-issue the query with an `after` cursor.
    After(String),
    /// Follow an absolute URL.
    Next(String),
}

impl ApiPage {
    /// Decodes a response body.
    pub fn parse(body: &[u8]) -> Result<Self, ProviderError> {
        serde_json::from_slice(body).map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }

    /// Continuation for the next page, if any.
    ///
    /// An empty page ends pagination regardless of cursors.
    pub fn continuation(&self) -> Option<Continuation> {
        if self.data.is_empty() {
            return None;
        }
        let paging = self.paging.as_ref()?;
        if let Some(after) = paging
            .cursors
            .as_ref()
            .and_then(|c| c.after.as_deref())
            .filter(|a| !a.is_empty())
        {
            return Some(Continuation::After(after.to_string()));
        }
        paging
            .next
            .as_deref()
            .filter(|n| !n.is_empty())
            .map(|n| Continuation::Next(n.to_string()))
    }
}

/// Identifier that may arrive as a string or a number.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FlexId {
    Text(String),
    Number(u64),
}

impl FlexId {
    /// Normalized string form; empty strings yield `None`.
    pub fn into_string(self) -> Option<String> {
        match self {
            FlexId::Text(s) => {
                let s = s.trim().to_string();
                (!s.is_empty()).then_some(s)
            }
            FlexId::Number(n) => Some(n.to_string()),
        }
    }
}

/// Sequence reference: either a bare id or `{ "id": ... }`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SequenceRef {
    Id(FlexId),
    Object { id: Option<FlexId> },
}

impl SequenceRef {
    pub fn into_id(self) -> Option<String> {
        match self {
            SequenceRef::Id(id) => id.into_string(),
            SequenceRef::Object { id } => id.and_then(FlexId::into_string),
        }
    }
}

/// GeoJSON-style point geometry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PointGeometry {
    #[serde(default)]
    pub coordinates: Vec<f64>,
}

impl PointGeometry {
    /// `(lon, lat)` when at least two finite coordinates are present.
    pub fn lon_lat(&self) -> Option<(f64, f64)> {
        match self.coordinates.as_slice() {
            [lon, lat, ..] if lon.is_finite() && lat.is_finite() => Some((*lon, *lat)),
            _ => None,
        }
    }
}

/// Image item as returned by the listing endpoint.
///
/// Every field is optional on the wire; validation into a record happens
/// in [`crate::record::Record::from_api`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ApiItem {
    #[serde(default)]
    pub id: Option<FlexId>,
    #[serde(default)]
    pub captured_at: Option<f64>,
    #[serde(default)]
    pub camera_type: Option<String>,
    #[serde(default)]
    pub compass_angle: Option<f64>,
    #[serde(default)]
    pub altitude: Option<f64>,
    #[serde(default)]
    pub sequence: Option<SequenceRef>,
    #[serde(default)]
    pub computed_geometry: Option<PointGeometry>,
    #[serde(default)]
    pub geometry: Option<PointGeometry>,
    #[serde(default)]
    pub thumb_256_url: Option<String>,
    #[serde(default)]
    pub thumb_1024_url: Option<String>,
    #[serde(default)]
    pub thumb_2048_url: Option<String>,
}
