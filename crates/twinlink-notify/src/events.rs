// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain events turned into user notifications.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::warn;
use twinlink_core::types::{
    Conversation, EndReason, Match, Message, MessageKind, Party, notification_types,
};
use twinlink_core::{DomainEvent, EventSink, StorageAdapter, TwinlinkError};

use crate::gateway::NotificationGateway;

/// Longest message excerpt carried in a notification body.
const PREVIEW_CHARS: usize = 120;

/// `EventSink` that notifies the humans affected by each event.
pub struct NotifyingSink {
    gateway: Arc<NotificationGateway>,
    storage: Arc<dyn StorageAdapter>,
}

impl NotifyingSink {
    pub fn new(gateway: Arc<NotificationGateway>, storage: Arc<dyn StorageAdapter>) -> Self {
        Self { gateway, storage }
    }

    async fn match_found(&self, proposal: &Match) -> Result<(), TwinlinkError> {
        let data = json!({ "match_id": proposal.id, "score": proposal.score });
        for user_id in [&proposal.user1_id, &proposal.user2_id] {
            self.gateway
                .publish(
                    user_id,
                    notification_types::MATCH_FOUND,
                    "New match found",
                    format!("You have a new match with a score of {:.2}.", proposal.score),
                    data.clone(),
                )
                .await?;
        }
        Ok(())
    }

    async fn match_accepted(&self, accepted: &Match) -> Result<(), TwinlinkError> {
        let data = json!({ "match_id": accepted.id });
        for user_id in [&accepted.user1_id, &accepted.user2_id] {
            self.gateway
                .publish(
                    user_id,
                    notification_types::MATCH_ACCEPTED,
                    "Match accepted",
                    "You both accepted the match.",
                    data.clone(),
                )
                .await?;
        }
        Ok(())
    }

    async fn message_received(
        &self,
        conversation: &Conversation,
        message: &Message,
    ) -> Result<(), TwinlinkError> {
        if message.kind != MessageKind::Text {
            return Ok(());
        }
        // Only human recipients; agent-to-agent traffic stays quiet.
        let Some(Party::User(recipient)) = conversation.counterpart(&message.sender) else {
            return Ok(());
        };
        let preview: String = message.content.chars().take(PREVIEW_CHARS).collect();
        self.gateway
            .publish(
                recipient,
                notification_types::MESSAGE_RECEIVED,
                format!("New message from {}", self.sender_name(&message.sender).await?),
                preview,
                json!({
                    "conversation_id": conversation.id,
                    "message_id": message.id,
                    "sequence": message.sequence,
                }),
            )
            .await?;
        Ok(())
    }

    async fn conversation_failed(&self, conversation: &Conversation) -> Result<(), TwinlinkError> {
        let mut owners: Vec<String> = Vec::with_capacity(2);
        for party in [&conversation.party_a, &conversation.party_b] {
            let owner = match party {
                Party::User(id) => Some(id.clone()),
                Party::Agent(id) => self.storage.get_agent(id).await?.map(|a| a.user_id),
            };
            if let Some(owner) = owner
                && !owners.contains(&owner)
            {
                owners.push(owner);
            }
        }
        let reason = conversation.failure_reason.clone().unwrap_or_default();
        for owner in owners {
            self.gateway
                .publish(
                    &owner,
                    notification_types::CONVERSATION_ENDED,
                    "Conversation failed",
                    format!("A conversation ended unexpectedly: {reason}"),
                    json!({ "conversation_id": conversation.id, "end_reason": EndReason::Failed }),
                )
                .await?;
        }
        Ok(())
    }

    async fn sender_name(&self, sender: &Party) -> Result<String, TwinlinkError> {
        Ok(match sender {
            Party::User(id) => self
                .storage
                .get_user(id)
                .await?
                .map_or_else(|| id.clone(), |u| u.display_name),
            Party::Agent(id) => self
                .storage
                .get_agent(id)
                .await?
                .map_or_else(|| id.clone(), |a| a.name),
        })
    }
}

#[async_trait]
impl EventSink for NotifyingSink {
    async fn emit(&self, event: DomainEvent) -> Result<(), TwinlinkError> {
        let name = event.name();
        let result = match &event {
            DomainEvent::MatchProposed(proposal) => self.match_found(proposal).await,
            DomainEvent::MatchAccepted(accepted) => self.match_accepted(accepted).await,
            DomainEvent::MatchRejected(_) => Ok(()),
            DomainEvent::MessageAppended {
                conversation,
                message,
            } => self.message_received(conversation, message).await,
            DomainEvent::ConversationEnded(conversation) => {
                if conversation.end_reason == Some(EndReason::Failed) {
                    self.conversation_failed(conversation).await
                } else {
                    Ok(())
                }
            }
            DomainEvent::JobFailed(job) => match &job.owner_user_id {
                Some(owner) => self
                    .gateway
                    .publish(
                        owner,
                        notification_types::JOB_FAILED,
                        "Background task failed",
                        format!(
                            "Task {} failed: {}",
                            job.kind,
                            job.error.as_deref().unwrap_or("unknown error")
                        ),
                        json!({ "job_id": job.id, "kind": job.kind }),
                    )
                    .await
                    .map(|_| ()),
                None => Ok(()),
            },
        };
        if let Err(e) = &result {
            warn!(event = name, error = %e, "notification for event failed");
        }
        result
    }
}
