// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding adapter trait for turning profile text into vectors.

use async_trait::async_trait;

use crate::error::TwinlinkError;
use crate::traits::adapter::PluginAdapter;

/// Text to embed, tagged with the entity it describes.
#[derive(Debug, Clone)]
pub struct EmbeddingRequest {
    pub entity_type: String,
    pub entity_id: String,
    pub text: String,
}

/// Adapter for an external embedding service.
#[async_trait]
pub trait EmbeddingAdapter: PluginAdapter {
    /// Embeds the request text into a dense vector.
    async fn embed(&self, request: EmbeddingRequest) -> Result<Vec<f32>, TwinlinkError>;

    /// Model identifier recorded alongside stored vectors.
    fn model(&self) -> &str;
}
