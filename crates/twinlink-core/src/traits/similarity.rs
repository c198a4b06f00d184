// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Nearest-neighbour search over stored embeddings.

use async_trait::async_trait;

use crate::error::TwinlinkError;

/// One search hit. Distance is cosine distance, `1 - similarity`, in `[0, 2]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub entity_id: String,
    pub distance: f32,
}

/// A queryable vector index.
#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    /// Stores `vector` as the current embedding of `entity_id`.
    async fn upsert(&self, entity_id: &str, vector: Vec<f32>, model: &str)
        -> Result<(), TwinlinkError>;

    /// Returns up to `top_k` nearest neighbours of `vector`, closest first,
    /// skipping every id in `exclude`.
    async fn query(
        &self,
        vector: &[f32],
        exclude: &[String],
        top_k: usize,
    ) -> Result<Vec<Neighbor>, TwinlinkError>;
}
