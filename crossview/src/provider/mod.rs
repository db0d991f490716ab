//! Remote imagery listing provider
//!
//! This module holds everything that touches the wire: the HTTP client
//! abstraction, the paginated listing query and the response types.
//!
//! # Wire protocol
//!
//! ```text
//! GET <base>?bbox=minlon,minlat,maxlon,maxlat&fields=...&image_type=photo&limit=N[&after=CURSOR]
//! Authorization: OAuth <token>
//!
//! { "data": [ {...}, ... ], "paging": { "cursors": { "after": "..." }, "next": "..." } }
//! ```
//!
//! Failed requests are classified by [`ProviderError::kind`] into transient,
//! rate-limited, unauthorized and permanent failures.
//!
//! # Example
//!
//! ```ignore
//! use crossview::provider::{ApiPage, AsyncHttpClient, ImageQuery, ReqwestClient};
//!
//! let client = ReqwestClient::with_token(&token, 60)?;
//! let query = ImageQuery::new(DEFAULT_BASE_URL, bbox);
//! let page = ApiPage::parse(&client.get(&query.url(None)?).await?)?;
//! ```

mod http;
mod query;
mod types;

pub use http::{AsyncHttpClient, ReqwestClient, DEFAULT_TIMEOUT_SECS};
pub use query::{ImageQuery, DEFAULT_BASE_URL, DEFAULT_FIELDS, DEFAULT_PAGE_SIZE};
pub use types::{
    ApiItem, ApiPage, Continuation, Cursors, FailureKind, FlexId, Paging, PointGeometry,
    ProviderError, SequenceRef,
};

#[cfg(test)]
pub use http::tests::MockAsyncHttpClient;
