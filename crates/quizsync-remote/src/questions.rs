//! Static question banks served over HTTP.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tracing::{debug, instrument};

use quizsync_core::error::FetchError;
use quizsync_core::traits::{validate_bank_name, QuestionSource};

/// Fetches `{base_url}/data/{name}` and parses it as JSON.
pub struct HttpQuestionSource {
    base_url: String,
    client: reqwest::Client,
}

impl HttpQuestionSource {
    pub fn new(base_url: &str, timeout_secs: u64) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl QuestionSource for HttpQuestionSource {
    #[instrument(skip(self))]
    async fn fetch(&self, name: &str) -> Result<serde_json::Value, FetchError> {
        validate_bank_name(name)?;
        let url = format!("{}/data/{name}", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        let value: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| FetchError::Parse(e.to_string()))?;

        debug!(url = %url, bytes = body.len(), "fetched question bank");
        Ok(value)
    }
}
