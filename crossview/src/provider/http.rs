//! HTTP client abstraction for testability

use std::future::Future;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};

use super::types::ProviderError;

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Trait for async HTTP client operations.
///
/// The acquisition engine only ever issues GET requests, one at a time per
/// tile. Implementations classify failures into [`ProviderError`] variants
/// so the engine can decide whether to retry.
pub trait AsyncHttpClient: Send + Sync {
    /// Performs an HTTP GET request and returns the response body.
    fn get(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, ProviderError>> + Send;
}

/// Real HTTP client implementation using reqwest.
///
/// The access token travels in the `Authorization` header, never in the
/// query string, so request URLs can be logged safely.
#[derive(Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Creates a client without credentials (asset downloads).
    pub fn new() -> Result<Self, ProviderError> {
        Self::build(None, DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a client that sends `Authorization: OAuth <token>`.
    pub fn with_token(token: &str, timeout_secs: u64) -> Result<Self, ProviderError> {
        Self::build(Some(token), timeout_secs)
    }

    /// Creates a client with a custom timeout.
    pub fn with_timeout(timeout_secs: u64) -> Result<Self, ProviderError> {
        Self::build(None, timeout_secs)
    }

    fn build(token: Option<&str>, timeout_secs: u64) -> Result<Self, ProviderError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = token {
            let mut value = HeaderValue::from_str(&format!("OAuth {}", token)).map_err(|_| {
                ProviderError::HttpError("access token contains invalid characters".to_string())
            })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| {
                ProviderError::HttpError(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { client })
    }
}

impl AsyncHttpClient for ReqwestClient {
    async fn get(&self, url: &str) -> Result<Vec<u8>, ProviderError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(url.to_string())
            } else if e.is_connect() || e.is_request() {
                ProviderError::Connection(e.to_string())
            } else {
                ProviderError::HttpError(format!("Request failed: {}", e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        response.bytes().await.map(|b| b.to_vec()).map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(url.to_string())
            } else {
                ProviderError::Connection(format!("Failed to read response: {}", e))
            }
        })
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted mock HTTP client.
    ///
    /// Responses are served in request order; once the script runs out the
    /// `fallback` response is returned. Every requested URL is recorded.
    pub struct MockAsyncHttpClient {
        script: Mutex<VecDeque<Result<Vec<u8>, ProviderError>>>,
        fallback: Result<Vec<u8>, ProviderError>,
        requests: Mutex<Vec<String>>,
    }

    impl MockAsyncHttpClient {
        pub fn new(script: Vec<Result<Vec<u8>, ProviderError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                fallback: Err(ProviderError::Status {
                    status: 404,
                    url: "unscripted".to_string(),
                }),
                requests: Mutex::new(Vec::new()),
            }
        }

        /// Always returns the same response.
        pub fn always(response: Result<Vec<u8>, ProviderError>) -> Self {
            let mut mock = Self::new(Vec::new());
            mock.fallback = response;
            mock
        }

        pub fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl AsyncHttpClient for MockAsyncHttpClient {
        async fn get(&self, url: &str) -> Result<Vec<u8>, ProviderError> {
            self.requests.lock().unwrap().push(url.to_string());
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or_else(|| self.fallback.clone())
        }
    }

    #[tokio::test]
    async fn test_mock_client_serves_script_in_order() {
        let mock = MockAsyncHttpClient::new(vec![
            Ok(vec![1]),
            Err(ProviderError::Status {
                status: 503,
                url: "u".to_string(),
            }),
        ]);

        assert_eq!(mock.get("http://a").await.unwrap(), vec![1]);
        assert!(mock.get("http://b").await.is_err());
        assert!(matches!(
            mock.get("http://c").await,
            Err(ProviderError::Status { status: 404, .. })
        ));
        assert_eq!(mock.requests(), vec!["http://a", "http://b", "http://c"]);
    }

    #[tokio::test]
    async fn test_mock_client_always() {
        let mock = MockAsyncHttpClient::always(Ok(vec![9, 9]));
        assert_eq!(mock.get("x").await.unwrap(), vec![9, 9]);
        assert_eq!(mock.get("y").await.unwrap(), vec![9, 9]);
    }

    #[test]
    fn test_reqwest_client_rejects_bad_token() {
        assert!(ReqwestClient::with_token("bad\ntoken", 5).is_err());
        assert!(ReqwestClient::with_token("MLY|123|abc", 5).is_ok());
    }
}
