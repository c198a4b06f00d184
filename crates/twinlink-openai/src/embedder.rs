// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding adapter over `POST /embeddings`.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};
use twinlink_config::model::EmbeddingConfig;
use twinlink_core::traits::EmbeddingRequest;
use twinlink_core::{AdapterType, EmbeddingAdapter, HealthStatus, PluginAdapter, TwinlinkError};

use crate::client::OpenAiClient;
use crate::resolve_api_key;
use crate::types::{EmbeddingsRequest, EmbeddingsResponse};

pub struct OpenAiEmbedder {
    client: OpenAiClient,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, TwinlinkError> {
        let api_key = resolve_api_key(&config.api_key)?;
        let client = OpenAiClient::new(&api_key, &config.base_url, Duration::from_secs(60))?;
        info!(
            model = %config.model,
            base_url = %client.base_url(),
            "embedding adapter initialized"
        );
        Ok(Self::with_client(client, config.model.clone()))
    }

    pub fn with_client(client: OpenAiClient, model: String) -> Self {
        Self { client, model }
    }
}

#[async_trait]
impl PluginAdapter for OpenAiEmbedder {
    fn name(&self) -> &str {
        "openai-embeddings"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }

    async fn health_check(&self) -> Result<HealthStatus, TwinlinkError> {
        // Probing would spend tokens.
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), TwinlinkError> {
        debug!("embedding adapter shutting down");
        Ok(())
    }
}

#[async_trait]
impl EmbeddingAdapter for OpenAiEmbedder {
    async fn embed(&self, request: EmbeddingRequest) -> Result<Vec<f32>, TwinlinkError> {
        let body = EmbeddingsRequest {
            model: self.model.clone(),
            input: request.text,
        };
        let response: EmbeddingsResponse = self.client.post_json("/embeddings", &body).await?;
        let vector = response
            .data
            .into_iter()
            .min_by_key(|d| d.index)
            .map(|d| d.embedding)
            .ok_or_else(|| TwinlinkError::provider("embedding response contained no data"))?;
        debug!(
            entity_type = %request.entity_type,
            entity_id = %request.entity_id,
            dimensions = vector.len(),
            "embedding received"
        );
        Ok(vector)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn embedder(server: &MockServer) -> OpenAiEmbedder {
        let client = OpenAiClient::new("sk-test", &server.uri(), Duration::from_secs(5)).unwrap();
        OpenAiEmbedder::with_client(client, "text-embedding-3-small".into())
    }

    fn request() -> EmbeddingRequest {
        EmbeddingRequest {
            entity_type: "agent".into(),
            entity_id: "a1".into(),
            text: "Persona: curious".into(),
        }
    }

    #[tokio::test]
    async fn embeds_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(body_partial_json(json!({
                "model": "text-embedding-3-small",
                "input": "Persona: curious"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "list",
                "data": [{"object": "embedding", "index": 0, "embedding": [0.25, -0.5, 1.0]}],
                "model": "text-embedding-3-small"
            })))
            .mount(&server)
            .await;

        let vector = embedder(&server).embed(request()).await.unwrap();
        assert_eq!(vector, vec![0.25, -0.5, 1.0]);
    }

    #[tokio::test]
    async fn empty_data_is_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .mount(&server)
            .await;

        let err = embedder(&server).embed(request()).await.unwrap_err();
        assert!(matches!(err, TwinlinkError::Provider { .. }));
    }
}
