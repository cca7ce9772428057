//! HTTP sink for the hosted analytics backend
//!
//! Speaks a small record-store protocol: single-record appends for the fast
//! path and batch writes, and a bulk endpoint for offline-queue replay.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use serde_json::Value;

use crate::config::BackendConfig;
use crate::error::{Error, Result};

use super::AnalyticsSink;

/// HTTP client for the analytics record store
pub struct HttpSink {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpSink {
    /// Build a sink from configuration.
    ///
    /// Returns `None` when the backend is disabled or not fully configured;
    /// the pipeline then runs in offline-only mode.
    pub fn from_config(config: &BackendConfig) -> Result<Option<Self>> {
        if !config.is_ready() {
            return Ok(None);
        }
        config.validate()?;

        let base_url = config
            .server_url
            .clone()
            .ok_or_else(|| Error::Config("backend.server_url is required".to_string()))?
            .trim_end_matches('/')
            .to_string();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(api_key) = &config.api_key {
            let auth_value = format!("Bearer {}", api_key);
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&auth_value)
                    .map_err(|e| Error::Config(format!("invalid api_key: {}", e)))?,
            );
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Some(Self {
            http_client,
            base_url,
        }))
    }

    async fn post_json<T: Serialize>(&self, url: &str, body: &T) -> Result<()> {
        let response = self
            .http_client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Backend(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            Err(Error::Backend(format!(
                "API error ({}): {}",
                status, error_text
            )))
        }
    }
}

impl AnalyticsSink for HttpSink {
    async fn append_record(&self, collection: &str, record: &Value) -> Result<()> {
        let url = format!("{}/v1/collections/{}/records", self.base_url, collection);
        self.post_json(&url, record).await
    }

    async fn bulk_write(&self, collection: &str, records: &[Value]) -> Result<()> {
        let url = format!("{}/v1/collections/{}/records/bulk", self.base_url, collection);
        let body = BulkWriteRequest { records };
        self.post_json(&url, &body).await
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.http_client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

/// Request body for the bulk endpoint
#[derive(Serialize)]
struct BulkWriteRequest<'a> {
    records: &'a [Value],
}
