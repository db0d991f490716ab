//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crossview::acquisition::{AssetConfig, FetchConfig, RetryPolicy};
use crossview::provider::{AsyncHttpClient, ProviderError};
use serde_json::json;

/// HTTP client that replays a fixed script of responses in request order.
///
/// Unscripted requests get a 404.
pub struct ScriptedClient {
    script: Mutex<VecDeque<Result<Vec<u8>, ProviderError>>>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedClient {
    pub fn new(script: Vec<Result<Vec<u8>, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

impl AsyncHttpClient for ScriptedClient {
    async fn get(&self, url: &str) -> Result<Vec<u8>, ProviderError> {
        self.requests.lock().unwrap().push(url.to_string());
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| {
            Err(ProviderError::Status {
                status: 404,
                url: url.to_string(),
            })
        })
    }
}

/// One API page holding `ids`, with no continuation.
pub fn page<S: AsRef<str>>(ids: &[S]) -> Result<Vec<u8>, ProviderError> {
    let data: Vec<_> = ids
        .iter()
        .map(|id| {
            json!({
                "id": id.as_ref(),
                "camera_type": "iPhone 12",
                "captured_at": 1_600_000_000_000i64,
                "computed_geometry": { "type": "Point", "coordinates": [4.89, 52.37] },
            })
        })
        .collect();
    Ok(json!({ "data": data }).to_string().into_bytes())
}

pub fn status(code: u16) -> Result<Vec<u8>, ProviderError> {
    Err(ProviderError::Status {
        status: code,
        url: "scripted".to_string(),
    })
}

/// Fetch settings without delays or image downloads.
pub fn fast_fetch_config(retries: u32) -> FetchConfig {
    FetchConfig::default()
        .with_politeness_delay(Duration::ZERO)
        .with_retry(
            RetryPolicy::exponential(retries)
                .with_initial_delay(Duration::ZERO)
                .with_jitter(Duration::ZERO),
        )
        .with_assets(AssetConfig::disabled())
}
