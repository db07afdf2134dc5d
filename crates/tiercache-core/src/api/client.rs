//! HTTP client for a REST document service used as the remote tier.
//!
//! The service exposes one collection of JSON documents keyed by cache key:
//!
//! - `GET    {base}/documents/{key}` - fetch a record (404 = miss)
//! - `PUT    {base}/documents/{key}` - upsert a record
//! - `DELETE {base}/documents/{key}` - remove a record (404 is fine)
//! - `GET    {base}/documents` - list keys
//! - `GET    {base}/documents?expiresBefore={rfc3339}` - keys expiring before a time
//! - `POST   {base}/documents:batchDelete` - remove up to 500 keys

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{header, Client, RequestBuilder, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::backend::{RemoteBackend, RemoteRecord, DEFAULT_MAX_BATCH_SIZE};
use super::RemoteError;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
/// Kept above the remote tier's own per-call timeout so that one always fires first.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 250;

#[derive(Debug, Deserialize)]
struct KeysResponse {
    keys: Vec<String>,
}

#[derive(Debug, Serialize)]
struct BatchDeleteRequest<'a> {
    keys: &'a [String],
}

#[derive(Debug, Deserialize)]
struct BatchDeleteResponse {
    deleted: usize,
}

/// Remote backend speaking to a REST document service.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpBackend {
    /// Create a new backend for the collection rooted at `base_url`
    pub fn new(base_url: &str) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        let base_url = Url::parse(base_url)
            .map_err(|e| RemoteError::InvalidResponse(format!("Invalid base URL {}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(RemoteError::InvalidResponse(format!(
                "Base URL cannot carry a path: {}",
                base_url
            )));
        }

        Ok(Self {
            client,
            base_url,
            token: None,
        })
    }

    /// Set the bearer token for authenticated requests
    pub fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }

    /// Create a new backend with the given token, sharing the connection pool.
    pub fn with_token(&self, token: String) -> Self {
        Self {
            client: self.client.clone(), // Cheap clone, shares connection pool
            base_url: self.base_url.clone(),
            token: Some(token),
        }
    }

    /// `{base}/{segments...}` with each segment percent-encoded
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        url
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header(header::ACCEPT, "application/json");
        match self.token {
            Some(ref token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<Option<reqwest::Response>, RemoteError> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status() == StatusCode::TOO_MANY_REQUESTS {
            // Rate limited - signal to retry
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(RemoteError::from_status(status, &body))
        }
    }

    /// Send a request built by `build`, backing off on 429 responses.
    async fn send(
        &self,
        build: impl Fn() -> RequestBuilder,
    ) -> Result<reqwest::Response, RemoteError> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = self.authorized(build()).send().await?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => return Ok(response),
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(RemoteError::RateLimited);
                    }
                    warn!(retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2; // Exponential backoff
                }
            }
        }
    }
}

#[async_trait]
impl RemoteBackend for HttpBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn get(&self, key: &str) -> Result<Option<RemoteRecord>, RemoteError> {
        let url = self.url(&["documents", key]);
        match self.send(|| self.client.get(url.clone())).await {
            Ok(response) => Ok(Some(response.json().await?)),
            Err(RemoteError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn set(&self, key: &str, record: &RemoteRecord) -> Result<(), RemoteError> {
        let url = self.url(&["documents", key]);
        self.send(|| self.client.put(url.clone()).json(record)).await?;
        debug!(key = key, "Remote document written");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), RemoteError> {
        let url = self.url(&["documents", key]);
        match self.send(|| self.client.delete(url.clone())).await {
            Ok(_) | Err(RemoteError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn list_keys(&self) -> Result<Vec<String>, RemoteError> {
        let url = self.url(&["documents"]);
        let response = self.send(|| self.client.get(url.clone())).await?;
        let parsed: KeysResponse = response.json().await?;
        Ok(parsed.keys)
    }

    async fn delete_batch(&self, keys: &[String]) -> Result<usize, RemoteError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let url = self.url(&["documents:batchDelete"]);
        let body = BatchDeleteRequest { keys };
        let response = self.send(|| self.client.post(url.clone()).json(&body)).await?;
        let parsed: BatchDeleteResponse = response.json().await?;
        Ok(parsed.deleted)
    }

    async fn query_expired_before(&self, ts: DateTime<Utc>) -> Result<Vec<String>, RemoteError> {
        let mut url = self.url(&["documents"]);
        url.query_pairs_mut()
            .append_pair("expiresBefore", &ts.to_rfc3339_opts(SecondsFormat::Millis, true));
        let response = self.send(|| self.client.get(url.clone())).await?;
        let parsed: KeysResponse = response.json().await?;
        Ok(parsed.keys)
    }

    fn max_batch_size(&self) -> usize {
        DEFAULT_MAX_BATCH_SIZE
    }
}
