//! Async STAC API client.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::{CatalogError, CatalogResponse, SceneCatalog, SceneQuery};

/// AWS Earth Search (Element 84) item search endpoint.
pub const EARTH_SEARCH_URL: &str = "https://earth-search.aws.element84.com/v1/search";

/// Sentinel-2 Level-2A collection id on Earth Search.
pub const SENTINEL2_L2A: &str = "sentinel-2-l2a";

/// Configuration for [`StacClient`].
#[derive(Debug, Clone)]
pub struct StacClientOptions {
    /// Full `POST /search` URL.
    pub search_url: String,
    pub collection: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Extra attempts on transport errors and 5xx responses.
    pub max_retries: u32,
    /// Delay before the first retry; doubles for each further attempt.
    pub retry_backoff: Duration,
}

impl Default for StacClientOptions {
    fn default() -> Self {
        Self {
            search_url: EARTH_SEARCH_URL.to_string(),
            collection: SENTINEL2_L2A.to_string(),
            request_timeout: Duration::from_secs(30),
            max_retries: 2,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

/// STAC Item Search client.
pub struct StacClient {
    client: reqwest::Client,
    options: StacClientOptions,
}

impl StacClient {
    pub fn new(options: StacClientOptions) -> Result<Self, CatalogError> {
        let client = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .build()
            .map_err(|e| CatalogError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, options })
    }

    pub fn options(&self) -> &StacClientOptions {
        &self.options
    }

    async fn post_once(&self, body: &Value) -> Result<Value, CatalogError> {
        let resp = self
            .client
            .post(&self.options.search_url)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(CatalogError::Unavailable {
                status: status.as_u16(),
                body: text.chars().take(500).collect(),
            });
        }

        resp.json::<Value>()
            .await
            .map_err(|e| CatalogError::Malformed(format!("invalid JSON: {e}")))
    }
}

#[async_trait]
impl SceneCatalog for StacClient {
    #[instrument(skip(self, query), fields(
        collection = %self.options.collection,
        window = %query.window,
        limit = query.limit,
    ))]
    async fn search(&self, query: &SceneQuery) -> Result<CatalogResponse, CatalogError> {
        let body = query.to_search_body(&self.options.collection);
        let start = Instant::now();
        let mut attempt = 0;

        let raw = loop {
            match self.post_once(&body).await {
                Ok(raw) => break raw,
                Err(e) if e.is_retryable() && attempt < self.options.max_retries => {
                    let delay = backoff_delay(self.options.retry_backoff, attempt);
                    attempt += 1;
                    warn!(error = %e, attempt, delay_ms = delay.as_millis() as u64, "STAC search failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        };

        let response = CatalogResponse::from_json(raw)?;
        info!(
            scenes = response.scenes.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "STAC search complete"
        );
        if let Some(first) = response.first() {
            debug!(scene = %first.id, cloud_cover = ?first.cloud_cover, "top-ranked scene");
        }
        Ok(response)
    }
}

/// Exponential backoff: `base * 2^attempt`, saturating.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}
