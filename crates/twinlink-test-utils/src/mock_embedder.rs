// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock embedding adapter for deterministic testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use twinlink_core::traits::EmbeddingRequest;
use twinlink_core::types::{AdapterType, HealthStatus};
use twinlink_core::{EmbeddingAdapter, PluginAdapter, TwinlinkError};

/// Returns a preset vector per entity id, `[1.0, 0.0]` otherwise.
pub struct MockEmbedder {
    vectors: Mutex<HashMap<String, Vec<f32>>>,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self {
            vectors: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    pub async fn set_vector(&self, entity_id: &str, vector: Vec<f32>) {
        self.vectors
            .lock()
            .await
            .insert(entity_id.to_string(), vector);
    }

    /// Make every following call fail with a provider error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockEmbedder {
    fn name(&self) -> &str {
        "mock-embedder"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }

    async fn health_check(&self) -> Result<HealthStatus, TwinlinkError> {
        if self.failing.load(Ordering::SeqCst) {
            return Ok(HealthStatus::Unhealthy("mock embedder failing".into()));
        }
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), TwinlinkError> {
        Ok(())
    }
}

#[async_trait]
impl EmbeddingAdapter for MockEmbedder {
    async fn embed(&self, request: EmbeddingRequest) -> Result<Vec<f32>, TwinlinkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(TwinlinkError::provider("mock embedder failure"));
        }
        Ok(self
            .vectors
            .lock()
            .await
            .get(&request.entity_id)
            .cloned()
            .unwrap_or_else(|| vec![1.0, 0.0]))
    }

    fn model(&self) -> &str {
        "mock-embedding"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(entity_id: &str) -> EmbeddingRequest {
        EmbeddingRequest {
            entity_type: "agent".into(),
            entity_id: entity_id.into(),
            text: "Persona: curious".into(),
        }
    }

    #[tokio::test]
    async fn preset_vectors_win_over_the_default() {
        let embedder = MockEmbedder::new();
        embedder.set_vector("a1", vec![0.0, 1.0]).await;
        assert_eq!(embedder.embed(request("a1")).await.unwrap(), vec![0.0, 1.0]);
        assert_eq!(embedder.embed(request("a2")).await.unwrap(), vec![1.0, 0.0]);
        assert_eq!(embedder.calls(), 2);
    }

    #[tokio::test]
    async fn failing_mode_returns_transient_errors() {
        let embedder = MockEmbedder::new();
        embedder.set_failing(true);
        let err = embedder.embed(request("a1")).await.unwrap_err();
        assert!(err.is_transient());
        assert!(matches!(
            embedder.health_check().await.unwrap(),
            HealthStatus::Unhealthy(_)
        ));
    }
}
