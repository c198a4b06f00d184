// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Job handlers that drive agent conversations.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use twinlink_core::types::{BackgroundJob, MatchStatus, job_kinds};
use twinlink_core::{GenerationAdapter, StorageAdapter, TwinlinkError};
use twinlink_scheduler::{JobContext, JobHandler};

use crate::orchestrator::ConversationOrchestrator;

#[derive(Debug, Deserialize)]
struct TurnPayload {
    conversation_id: String,
    speaker: String,
    #[serde(default)]
    after_sequence: i64,
}

#[derive(Debug, Deserialize)]
struct MatchPayload {
    match_id: String,
}

/// `conversation.turn`: one generated agent turn.
pub struct TurnHandler {
    orchestrator: Arc<ConversationOrchestrator>,
    generator: Arc<dyn GenerationAdapter>,
}

impl TurnHandler {
    pub fn new(
        orchestrator: Arc<ConversationOrchestrator>,
        generator: Arc<dyn GenerationAdapter>,
    ) -> Self {
        Self {
            orchestrator,
            generator,
        }
    }
}

#[async_trait]
impl JobHandler for TurnHandler {
    fn kind(&self) -> &'static str {
        job_kinds::CONVERSATION_TURN
    }

    async fn run(&self, ctx: &JobContext) -> Result<serde_json::Value, TwinlinkError> {
        let payload: TurnPayload = ctx.payload()?;
        let appended = self
            .orchestrator
            .agent_turn(
                self.generator.as_ref(),
                &payload.conversation_id,
                &payload.speaker,
                payload.after_sequence,
            )
            .await?;
        Ok(match appended {
            Some(turn) => json!({
                "sequence": turn.message.sequence,
                "status": turn.conversation.status,
            }),
            None => json!({ "skipped": true }),
        })
    }

    /// A turn that keeps failing takes the whole conversation down with it.
    async fn on_exhausted(&self, job: &BackgroundJob, error: &str) -> Result<(), TwinlinkError> {
        let payload: TurnPayload = serde_json::from_value(job.payload.clone())
            .map_err(|e| TwinlinkError::Corrupt(format!("turn payload: {e}")))?;
        self.orchestrator
            .fail(&payload.conversation_id, error)
            .await?;
        Ok(())
    }
}

/// `conversation.start`: opens the agent-to-agent conversation of a match.
pub struct StartConversationHandler {
    orchestrator: Arc<ConversationOrchestrator>,
    storage: Arc<dyn StorageAdapter>,
}

impl StartConversationHandler {
    pub fn new(
        orchestrator: Arc<ConversationOrchestrator>,
        storage: Arc<dyn StorageAdapter>,
    ) -> Self {
        Self {
            orchestrator,
            storage,
        }
    }
}

#[async_trait]
impl JobHandler for StartConversationHandler {
    fn kind(&self) -> &'static str {
        job_kinds::START_CONVERSATION
    }

    async fn run(&self, ctx: &JobContext) -> Result<serde_json::Value, TwinlinkError> {
        let payload: MatchPayload = ctx.payload()?;
        let proposal = self
            .storage
            .get_match(&payload.match_id)
            .await?
            .ok_or_else(|| TwinlinkError::NotFound {
                entity: "match",
                id: payload.match_id.clone(),
            })?;

        if let Some(existing) = &proposal.conversation_id {
            return Ok(json!({ "conversation_id": existing, "skipped": true }));
        }
        if matches!(proposal.status, MatchStatus::Rejected | MatchStatus::Expired) {
            debug!(
                match_id = %proposal.id,
                status = %proposal.status,
                "match closed, no conversation"
            );
            return Ok(json!({ "skipped": true }));
        }

        match self.orchestrator.start_for_match(&proposal).await? {
            Some(conversation) => Ok(json!({ "conversation_id": conversation.id })),
            None => Ok(json!({ "skipped": true })),
        }
    }
}

/// `conversation.inactivity_sweep`
pub struct InactivitySweepHandler {
    orchestrator: Arc<ConversationOrchestrator>,
}

impl InactivitySweepHandler {
    pub fn new(orchestrator: Arc<ConversationOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl JobHandler for InactivitySweepHandler {
    fn kind(&self) -> &'static str {
        job_kinds::INACTIVITY_SWEEP
    }

    async fn run(&self, _ctx: &JobContext) -> Result<serde_json::Value, TwinlinkError> {
        let ended = self.orchestrator.end_inactive().await?;
        Ok(json!({ "ended": ended.len() }))
    }
}
