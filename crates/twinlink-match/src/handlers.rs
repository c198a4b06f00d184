// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Job handlers for match discovery and maintenance.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use twinlink_core::traits::ReasonRequest;
use twinlink_core::types::job_kinds;
use twinlink_core::{GenerationAdapter, StorageAdapter, TwinlinkError};
use twinlink_scheduler::{JobContext, JobHandler, JobQueue};

use crate::engine::MatchEngine;

#[derive(Debug, Deserialize)]
struct UserPayload {
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct MatchPayload {
    match_id: String,
}

/// `match.discover`
pub struct DiscoverHandler {
    engine: Arc<MatchEngine>,
}

impl DiscoverHandler {
    pub fn new(engine: Arc<MatchEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl JobHandler for DiscoverHandler {
    fn kind(&self) -> &'static str {
        job_kinds::DISCOVER_MATCHES
    }

    async fn run(&self, ctx: &JobContext) -> Result<serde_json::Value, TwinlinkError> {
        let payload: UserPayload = ctx.payload()?;
        let pending = self.engine.discover(&payload.user_id).await?;
        let ids: Vec<&str> = pending.iter().map(|m| m.id.as_str()).collect();
        Ok(json!({ "pending_match_ids": ids }))
    }
}

/// `match.discovery_sweep`: one `match.discover` job per user with an
/// active agent.
pub struct DiscoverySweepHandler {
    storage: Arc<dyn StorageAdapter>,
    queue: JobQueue,
}

impl DiscoverySweepHandler {
    pub fn new(storage: Arc<dyn StorageAdapter>, queue: JobQueue) -> Self {
        Self { storage, queue }
    }
}

#[async_trait]
impl JobHandler for DiscoverySweepHandler {
    fn kind(&self) -> &'static str {
        job_kinds::DISCOVERY_SWEEP
    }

    async fn run(&self, ctx: &JobContext) -> Result<serde_json::Value, TwinlinkError> {
        let users: BTreeSet<String> = self
            .storage
            .list_active_agents()
            .await?
            .into_iter()
            .map(|a| a.user_id)
            .collect();
        let total = users.len();
        for (done, user_id) in users.into_iter().enumerate() {
            self.queue
                .enqueue(
                    job_kinds::DISCOVER_MATCHES,
                    json!({ "user_id": user_id }),
                    Some(&user_id),
                )
                .await?;
            if total > 0 {
                ctx.set_progress(((done + 1) * 100 / total) as u8).await?;
            }
        }
        debug!(users = total, "discovery sweep enqueued");
        Ok(json!({ "users": total }))
    }
}

/// `match.expire`
pub struct ExpireHandler {
    engine: Arc<MatchEngine>,
}

impl ExpireHandler {
    pub fn new(engine: Arc<MatchEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl JobHandler for ExpireHandler {
    fn kind(&self) -> &'static str {
        job_kinds::EXPIRE_MATCHES
    }

    async fn run(&self, _ctx: &JobContext) -> Result<serde_json::Value, TwinlinkError> {
        let expired = self.engine.expire_due().await?;
        Ok(json!({ "expired": expired.len() }))
    }
}

/// `match.reason`: stores a generated explanation on the match.
pub struct ReasonHandler {
    storage: Arc<dyn StorageAdapter>,
    generator: Arc<dyn GenerationAdapter>,
}

impl ReasonHandler {
    pub fn new(storage: Arc<dyn StorageAdapter>, generator: Arc<dyn GenerationAdapter>) -> Self {
        Self { storage, generator }
    }
}

#[async_trait]
impl JobHandler for ReasonHandler {
    fn kind(&self) -> &'static str {
        job_kinds::MATCH_REASON
    }

    async fn run(&self, ctx: &JobContext) -> Result<serde_json::Value, TwinlinkError> {
        let payload: MatchPayload = ctx.payload()?;
        let m = self
            .storage
            .get_match(&payload.match_id)
            .await?
            .ok_or_else(|| TwinlinkError::NotFound {
                entity: "match",
                id: payload.match_id.clone(),
            })?;
        let first = self.agent(&m.agent1_id).await?;
        let second = self.agent(&m.agent2_id).await?;

        let reason = self
            .generator
            .explain_match(ReasonRequest {
                first,
                second,
                score: m.score,
            })
            .await?;
        self.storage.set_match_reason(&m.id, &reason).await?;
        Ok(json!({ "match_id": m.id, "reason_chars": reason.chars().count() }))
    }
}

impl ReasonHandler {
    async fn agent(&self, id: &str) -> Result<twinlink_core::types::Agent, TwinlinkError> {
        self.storage
            .get_agent(id)
            .await?
            .ok_or_else(|| TwinlinkError::NotFound {
                entity: "agent",
                id: id.to_string(),
            })
    }
}
