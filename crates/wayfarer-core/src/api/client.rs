//! Client for the push-event content server.

use std::time::Duration;

use anyhow::{Context, Result};
use futures::Stream;
use reqwest::{header, Client};
use tracing::{debug, warn};

use super::ApiError;
use crate::models::{GeoLevel, LocationContext};
use crate::stream::{decode, Event, StreamError};

// ============================================================================
// Constants
// ============================================================================

/// Path of the push-event endpoint, relative to the server URL.
const STREAM_PATH: &str = "stream";

/// Connection timeout in seconds.
/// The stream itself is long-lived, so only connecting is bounded.
const CONNECT_TIMEOUT_SECS: u64 = 15;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Client for opening push-event streams.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct StreamClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl StreamClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            token: None,
        })
    }

    /// Create a client with the given bearer token, sharing the connection pool.
    pub fn with_token(&self, token: String) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: Some(token),
        }
    }

    fn stream_url(&self) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), STREAM_PATH)
    }

    /// Query parameters describing `location`: coordinates plus every resolved name.
    fn location_query(location: &LocationContext) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("lat", location.latitude.to_string()),
            ("lon", location.longitude.to_string()),
        ];
        for level in GeoLevel::ALL {
            if let Some(name) = location.name(level) {
                query.push((level.as_str(), name.to_string()));
            }
        }
        query
    }

    fn headers(&self) -> Result<header::HeaderMap> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("text/event-stream"));
        if let Some(ref token) = self.token {
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(&format!("Bearer {}", token))?,
            );
        }
        Ok(headers)
    }

    /// Check if response is successful.
    /// Returns Ok(None) for rate limit (should retry), or Err for other errors.
    async fn check_response_for_retry(response: reqwest::Response) -> Result<Option<reqwest::Response>> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body).into())
        }
    }

    /// Open the push-event stream for `location`.
    ///
    /// The returned stream yields decoded events until the server closes the
    /// connection; dropping it closes the connection.
    pub async fn open(&self, location: &LocationContext) -> Result<impl Stream<Item = Result<Event, StreamError>>> {
        let url = self.stream_url();
        let query = Self::location_query(location);
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = self
                .client
                .get(&url)
                .headers(self.headers()?)
                .query(&query)
                .send()
                .await
                .with_context(|| format!("Failed to open event stream at {}", url))?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => {
                    debug!(url = %url, "Event stream opened");
                    return Ok(decode(response.bytes_stream()));
                }
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited.into());
                    }
                    warn!(url = %url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2;
                }
            }
        }
    }
}
