// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sinks for domain events and conversation outcomes.

use async_trait::async_trait;

use crate::error::TwinlinkError;
use crate::types::{BackgroundJob, Conversation, EndReason, Match, Message};

/// A state change other components may react to.
#[derive(Debug, Clone)]
pub enum DomainEvent {
    MatchProposed(Match),
    MatchAccepted(Match),
    MatchRejected(Match),
    MessageAppended {
        conversation: Conversation,
        message: Message,
    },
    ConversationEnded(Conversation),
    JobFailed(BackgroundJob),
}

impl DomainEvent {
    /// Stable name used in logs and metrics labels.
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::MatchProposed(_) => "match_proposed",
            DomainEvent::MatchAccepted(_) => "match_accepted",
            DomainEvent::MatchRejected(_) => "match_rejected",
            DomainEvent::MessageAppended { .. } => "message_appended",
            DomainEvent::ConversationEnded(_) => "conversation_ended",
            DomainEvent::JobFailed(_) => "job_failed",
        }
    }
}

/// Summary of a finished conversation handed back to matching.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationOutcome {
    pub conversation_id: String,
    pub match_id: Option<String>,
    pub end_reason: EndReason,
    pub turns: i64,
    /// Mean of the compatibility estimates the agents attached to turns.
    pub compatibility: Option<f64>,
}

/// Receives domain events. Implementations must not fail the caller's
/// already-committed state change.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: DomainEvent) -> Result<(), TwinlinkError>;
}

/// Receives outcomes of conversations that ended.
#[async_trait]
pub trait OutcomeSink: Send + Sync {
    async fn conversation_concluded(
        &self,
        outcome: ConversationOutcome,
    ) -> Result<(), TwinlinkError>;
}
