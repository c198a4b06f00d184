// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Brute-force cosine index over the current agent embeddings.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use twinlink_core::types::{AGENT_ENTITY, Embedding, now_timestamp};
use twinlink_core::traits::Neighbor;
use twinlink_core::{SimilarityIndex, StorageAdapter, TwinlinkError};

/// Similarity index backed by the `embeddings` table.
///
/// Every query scans the current vectors of agents that can be proposed:
/// the agent is active and its owner is active and discoverable. These
/// filters run before the `top_k` cut. Vectors whose dimension differs
/// from the query (e.g. from an older model) are skipped.
pub struct SqliteSimilarityIndex {
    storage: Arc<dyn StorageAdapter>,
}

impl SqliteSimilarityIndex {
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl SimilarityIndex for SqliteSimilarityIndex {
    async fn upsert(
        &self,
        entity_id: &str,
        vector: Vec<f32>,
        model: &str,
    ) -> Result<(), TwinlinkError> {
        let embedding = Embedding {
            id: uuid::Uuid::new_v4().to_string(),
            entity_type: AGENT_ENTITY.to_string(),
            entity_id: entity_id.to_string(),
            vector,
            model: model.to_string(),
            is_current: true,
            superseded_by: None,
            created_at: now_timestamp(),
        };
        self.storage.save_embedding(&embedding).await
    }

    async fn query(
        &self,
        vector: &[f32],
        exclude: &[String],
        top_k: usize,
    ) -> Result<Vec<Neighbor>, TwinlinkError> {
        let excluded: HashSet<&str> = exclude.iter().map(String::as_str).collect();
        let mut neighbors: Vec<Neighbor> = self
            .storage
            .discoverable_agent_embeddings()
            .await?
            .into_iter()
            .filter(|e| !excluded.contains(e.entity_id.as_str()))
            .filter_map(|e| {
                cosine_distance(vector, &e.vector).map(|distance| Neighbor {
                    entity_id: e.entity_id,
                    distance,
                })
            })
            .collect();

        neighbors.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.entity_id.cmp(&b.entity_id))
        });
        neighbors.truncate(top_k);
        Ok(neighbors)
    }
}

/// Cosine distance `1 - cos(a, b)` in `[0, 2]`. `None` for mismatched
/// dimensions or a zero vector.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    let cosine = (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0);
    Some(1.0 - cosine)
}
