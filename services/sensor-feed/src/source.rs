//! Upstream measurement provider
//!
//! The provider answers a GET with a JSON array of measurements. Transport
//! failures, non-success statuses and malformed bodies each abort the whole
//! batch; nothing from a failed fetch reaches the cache.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use types::errors::FeedError;
use types::measurement::Measurement;

/// Source of measurement batches for the poller.
#[async_trait]
pub trait MeasurementSource: Send + Sync {
    async fn fetch_batch(&self) -> Result<Vec<Measurement>, FeedError>;
}

/// HTTP provider client.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    url: String,
}

impl HttpSource {
    /// Build a client for `url` with a per-request timeout.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("sensor-feed/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| FeedError::Fetch {
                reason: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl MeasurementSource for HttpSource {
    async fn fetch_batch(&self) -> Result<Vec<Measurement>, FeedError> {
        debug!(url = %self.url, "Fetching measurements");

        let res = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| FeedError::Fetch {
                reason: e.to_string(),
            })?;

        let status = res.status();
        if !status.is_success() {
            return Err(FeedError::UpstreamStatus {
                status: status.as_u16(),
            });
        }

        // Read the whole body before decoding so a truncated transfer is a
        // fetch failure, not a partial batch.
        let body = res.bytes().await.map_err(|e| FeedError::Fetch {
            reason: e.to_string(),
        })?;

        let batch = Measurement::decode_batch(&body)?;
        debug!(records = batch.len(), "Decoded measurement batch");
        Ok(batch)
    }
}
