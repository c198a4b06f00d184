// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Agent embedding pipeline and its job handler.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};
use twinlink_core::traits::EmbeddingRequest;
use twinlink_core::types::{AGENT_ENTITY, Agent, job_kinds};
use twinlink_core::{EmbeddingAdapter, SimilarityIndex, StorageAdapter, TwinlinkError};
use twinlink_scheduler::{JobContext, JobHandler, JobQueue};

use crate::text::agent_profile_text;

/// Computes agent vectors and stores them in the similarity index.
pub struct EmbeddingService {
    storage: Arc<dyn StorageAdapter>,
    embedder: Arc<dyn EmbeddingAdapter>,
    index: Arc<dyn SimilarityIndex>,
}

impl EmbeddingService {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        embedder: Arc<dyn EmbeddingAdapter>,
        index: Arc<dyn SimilarityIndex>,
    ) -> Self {
        Self {
            storage,
            embedder,
            index,
        }
    }

    /// Embed the agent's current profile, superseding its previous vector.
    pub async fn embed_agent(&self, agent_id: &str) -> Result<(Agent, usize), TwinlinkError> {
        let agent = self
            .storage
            .get_agent(agent_id)
            .await?
            .ok_or_else(|| TwinlinkError::NotFound {
                entity: "agent",
                id: agent_id.to_string(),
            })?;

        let mut text = agent_profile_text(&agent);
        if text.is_empty() {
            text = agent.name.clone();
        }

        let started = Instant::now();
        let vector = self
            .embedder
            .embed(EmbeddingRequest {
                entity_type: AGENT_ENTITY.to_string(),
                entity_id: agent.id.clone(),
                text,
            })
            .await?;
        metrics::histogram!("twinlink_embedding_latency_seconds")
            .record(started.elapsed().as_secs_f64());
        if vector.is_empty() {
            return Err(TwinlinkError::provider("embedding service returned an empty vector"));
        }

        let dimensions = vector.len();
        self.index
            .upsert(&agent.id, vector, self.embedder.model())
            .await?;
        metrics::counter!("twinlink_embeddings_total").increment(1);
        debug!(agent_id = %agent.id, dimensions, model = self.embedder.model(), "agent embedded");
        Ok((agent, dimensions))
    }
}

#[derive(Debug, Deserialize)]
struct EmbedAgentPayload {
    agent_id: String,
    /// Enqueue discovery for the owner once the vector is stored.
    #[serde(default = "default_discover")]
    discover: bool,
}

fn default_discover() -> bool {
    true
}

/// Handles `agent.embed`.
pub struct EmbedAgentHandler {
    service: Arc<EmbeddingService>,
    queue: JobQueue,
}

impl EmbedAgentHandler {
    pub fn new(service: Arc<EmbeddingService>, queue: JobQueue) -> Self {
        Self { service, queue }
    }
}

#[async_trait]
impl JobHandler for EmbedAgentHandler {
    fn kind(&self) -> &'static str {
        job_kinds::EMBED_AGENT
    }

    async fn run(&self, ctx: &JobContext) -> Result<serde_json::Value, TwinlinkError> {
        let payload: EmbedAgentPayload = ctx.payload()?;
        let (agent, dimensions) = self.service.embed_agent(&payload.agent_id).await?;
        ctx.set_progress(80).await?;

        let discovery = if payload.discover && agent.is_active {
            let job = self
                .queue
                .enqueue(
                    job_kinds::DISCOVER_MATCHES,
                    json!({ "user_id": agent.user_id }),
                    Some(&agent.user_id),
                )
                .await?;
            info!(agent_id = %agent.id, job_id = %job.id, "discovery chained after embedding");
            Some(job.id)
        } else {
            None
        };

        Ok(json!({
            "agent_id": agent.id,
            "dimensions": dimensions,
            "discovery_job_id": discovery,
        }))
    }
}
