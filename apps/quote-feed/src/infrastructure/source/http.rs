//! HTTP Polling Source
//!
//! Fetches quote tick batches from an HTTP endpoint that answers each GET
//! with a JSON array, returning `[]` once the simulated feed is exhausted.

use std::time::Duration;

use async_trait::async_trait;

use super::decode_batch;
use crate::application::ports::{BatchSource, SourceError};
use crate::domain::quote::QuoteTick;

/// Configuration for the HTTP source.
#[derive(Debug, Clone)]
pub struct HttpSourceConfig {
    /// Endpoint answering GET with a JSON tick array.
    pub endpoint: String,
    /// Per-request timeout enforced by the HTTP client.
    pub request_timeout: Duration,
}

impl Default for HttpSourceConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080/query?id=1".to_string(),
            request_timeout: Duration::from_secs(2),
        }
    }
}

/// [`BatchSource`] that polls an HTTP endpoint.
#[derive(Debug)]
pub struct HttpBatchSource {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpBatchSource {
    /// Build the source, constructing the underlying HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Transport`] if the client cannot be built.
    pub fn new(config: HttpSourceConfig) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SourceError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: config.endpoint,
        })
    }

    /// The endpoint this source polls.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl BatchSource for HttpBatchSource {
    async fn fetch_batch(&self) -> Result<Vec<QuoteTick>, SourceError> {
        let response = self
            .client
            .get(&self.endpoint)
            .send()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Transport(format!(
                "unexpected status {status} from {}",
                self.endpoint
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;
        decode_batch(&body)
    }
}
