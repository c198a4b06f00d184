// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for OpenAI-compatible APIs.
//!
//! Provides [`OpenAiClient`] which handles authentication, JSON request
//! construction, and a single retry on transient errors.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use twinlink_core::TwinlinkError;

use crate::types::ApiErrorResponse;

/// Authenticated JSON client bound to one API base URL.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
}

impl OpenAiClient {
    /// `base_url` is the API root, e.g. `https://api.openai.com/v1`.
    pub fn new(api_key: &str, base_url: &str, timeout: Duration) -> Result<Self, TwinlinkError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|e| TwinlinkError::Config(format!("invalid API key header value: {e}")))?,
        );
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| TwinlinkError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retries: 1,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST `body` to `{base_url}{path}` and decode the JSON response.
    ///
    /// On transient errors (429, 500, 502, 503), retries once after a 1-second delay.
    pub async fn post_json<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, TwinlinkError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = format!("{}{path}", self.base_url);
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                warn!(attempt, url = %url, "retrying request after transient error");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }

            let response = self
                .client
                .post(&url)
                .json(body)
                .send()
                .await
                .map_err(|e| TwinlinkError::Provider {
                    message: format!("HTTP request failed: {e}"),
                    source: Some(Box::new(e)),
                })?;

            let status = response.status();
            debug!(status = %status, attempt, path, "response received");

            if status.is_success() {
                let text = response.text().await.map_err(|e| TwinlinkError::Provider {
                    message: format!("failed to read response body: {e}"),
                    source: Some(Box::new(e)),
                })?;
                return serde_json::from_str(&text).map_err(|e| TwinlinkError::Provider {
                    message: format!("failed to parse API response: {e}"),
                    source: Some(Box::new(e)),
                });
            }

            let text = response.text().await.unwrap_or_default();
            if is_transient_error(status) && attempt < self.max_retries {
                warn!(status = %status, body = %text, "transient error, will retry");
                last_error = Some(TwinlinkError::provider(format!(
                    "API returned {status}: {text}"
                )));
                continue;
            }

            let message = match serde_json::from_str::<ApiErrorResponse>(&text) {
                Ok(api_err) => format!(
                    "API error ({}, {}): {}",
                    status,
                    api_err.error.type_.as_deref().unwrap_or("unknown"),
                    api_err.error.message
                ),
                Err(_) => format!("API returned {status}: {text}"),
            };
            return Err(TwinlinkError::provider(message));
        }

        Err(last_error.unwrap_or_else(|| TwinlinkError::provider("request failed after retries")))
    }
}

/// Returns true for HTTP status codes that indicate transient errors worth retrying.
fn is_transient_error(status: reqwest::StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503)
}
