// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation lifecycle.
//!
//! ```text
//!   active ──(max turns | marker | inactivity | close | failure)──▶ ended ◀──▶ archived
//! ```
//!
//! Turn appends and the resulting end transition happen in one storage
//! transaction; events, outcomes, and follow-up turn jobs run after commit.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};
use twinlink_config::model::ConversationConfig;
use twinlink_core::traits::TurnRequest;
use twinlink_core::types::{
    AppendedTurn, Conversation, ConversationKind, ConversationStatus, EndReason, Match, Message,
    MessageKind, NewMessage, Page, Party, format_timestamp, job_kinds,
};
use twinlink_core::{
    ConversationOutcome, DomainEvent, EventSink, GenerationAdapter, OutcomeSink, StorageAdapter,
    TwinlinkError,
};
use twinlink_scheduler::JobQueue;

use crate::turns::{compatibility_metadata, mean_compatibility, strip_marker};

/// Messages handed to the generator as context.
const TRANSCRIPT_WINDOW: i64 = 50;

/// Upper bound when reading a whole conversation.
const FULL_TRANSCRIPT: i64 = 10_000;

pub struct ConversationOrchestrator {
    storage: Arc<dyn StorageAdapter>,
    queue: JobQueue,
    events: Arc<dyn EventSink>,
    outcomes: Arc<dyn OutcomeSink>,
    config: ConversationConfig,
}

impl ConversationOrchestrator {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        queue: JobQueue,
        events: Arc<dyn EventSink>,
        outcomes: Arc<dyn OutcomeSink>,
        config: ConversationConfig,
    ) -> Self {
        Self {
            storage,
            queue,
            events,
            outcomes,
            config,
        }
    }

    pub fn config(&self) -> &ConversationConfig {
        &self.config
    }

    /// Open a conversation between two existing, active parties.
    pub async fn start(
        &self,
        kind: ConversationKind,
        party_a: Party,
        party_b: Party,
    ) -> Result<Conversation, TwinlinkError> {
        let conversation = self.draft(kind, party_a, party_b, None).await?;
        self.storage.create_conversation(&conversation).await?;
        self.launch(&conversation).await?;
        Ok(conversation)
    }

    /// Open the agent-to-agent conversation of a match. Returns `None`, with
    /// nothing written, when the match already has a conversation or is
    /// closed.
    pub async fn start_for_match(
        &self,
        proposal: &Match,
    ) -> Result<Option<Conversation>, TwinlinkError> {
        let conversation = self
            .draft(
                ConversationKind::AgentToAgent,
                Party::Agent(proposal.agent1_id.clone()),
                Party::Agent(proposal.agent2_id.clone()),
                Some(&proposal.id),
            )
            .await?;
        if !self.storage.create_conversation(&conversation).await? {
            debug!(match_id = %proposal.id, "match already has a conversation");
            return Ok(None);
        }
        self.launch(&conversation).await?;
        Ok(Some(conversation))
    }

    async fn draft(
        &self,
        kind: ConversationKind,
        party_a: Party,
        party_b: Party,
        match_id: Option<&str>,
    ) -> Result<Conversation, TwinlinkError> {
        let (slot_a, slot_b) = kind.slot_kinds();
        if party_a.kind() != slot_a || party_b.kind() != slot_b {
            return Err(TwinlinkError::InvalidParticipants(format!(
                "{kind} conversation needs ({slot_a}, {slot_b}) slots, got ({party_a}, {party_b})"
            )));
        }
        if party_a == party_b {
            return Err(TwinlinkError::InvalidParticipants(format!(
                "{party_a} cannot converse with itself"
            )));
        }
        self.require_active_party(&party_a).await?;
        self.require_active_party(&party_b).await?;

        let now = format_timestamp(Utc::now());
        let max_turns = if kind.involves_agent() {
            Some(self.config.max_turns)
        } else {
            self.config.max_user_turns
        };
        Ok(Conversation {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            party_a,
            party_b,
            status: ConversationStatus::Active,
            match_id: match_id.map(str::to_string),
            turn_count: 0,
            max_turns,
            end_reason: None,
            failure_reason: None,
            last_message_at: None,
            ended_at: None,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Side effects of a stored conversation: agent counters and the
    /// opening turn.
    async fn launch(&self, conversation: &Conversation) -> Result<(), TwinlinkError> {
        for party in [&conversation.party_a, &conversation.party_b] {
            if let Party::Agent(agent_id) = party {
                self.storage
                    .record_agent_conversation(agent_id, &conversation.created_at)
                    .await?;
            }
        }

        let opener = match conversation.kind {
            ConversationKind::AgentToAgent => Some(conversation.party_a.id()),
            ConversationKind::UserToAgent => Some(conversation.party_b.id()),
            ConversationKind::UserToUser => None,
        };
        if let Some(speaker) = opener {
            self.enqueue_turn(&conversation.id, speaker, 0).await?;
        }

        metrics::counter!(
            "twinlink_conversations_started_total",
            "kind" => conversation.kind.to_string()
        )
        .increment(1);
        info!(
            conversation_id = %conversation.id,
            kind = %conversation.kind,
            match_id = ?conversation.match_id,
            "conversation started"
        );
        Ok(())
    }

    /// Start on behalf of `user_id`, who must hold slot A directly or through
    /// their agent.
    pub async fn start_as(
        &self,
        user_id: &str,
        kind: ConversationKind,
        party_a: Party,
        party_b: Party,
    ) -> Result<Conversation, TwinlinkError> {
        if !self.represents(&party_a, user_id).await? {
            return Err(TwinlinkError::InvalidParticipants(format!(
                "user {user_id} does not hold slot {party_a}"
            )));
        }
        self.start(kind, party_a, party_b).await
    }

    /// Append one message. Ends the conversation when the message concludes
    /// it or the turn limit is reached.
    pub async fn append_turn(
        &self,
        conversation_id: &str,
        message: NewMessage,
    ) -> Result<AppendedTurn, TwinlinkError> {
        let appended = self
            .storage
            .append_message(conversation_id, &message, &format_timestamp(Utc::now()))
            .await?;
        metrics::counter!("twinlink_messages_total").increment(1);
        debug!(
            conversation_id,
            sequence = appended.message.sequence,
            sender = %appended.message.sender,
            "turn appended"
        );

        self.emit(DomainEvent::MessageAppended {
            conversation: appended.conversation.clone(),
            message: appended.message.clone(),
        })
        .await;

        if appended.conversation.status == ConversationStatus::Active {
            self.schedule_reply(&appended).await?;
        } else {
            self.finalize(&appended.conversation).await;
        }
        Ok(appended)
    }

    /// Generate and append the next turn of `speaker_agent_id`.
    ///
    /// Returns `None` without generating when the conversation is no longer
    /// active or a message newer than `after_sequence` already exists.
    pub async fn agent_turn(
        &self,
        generator: &dyn GenerationAdapter,
        conversation_id: &str,
        speaker_agent_id: &str,
        after_sequence: i64,
    ) -> Result<Option<AppendedTurn>, TwinlinkError> {
        let conversation = self.require_conversation(conversation_id).await?;
        if conversation.status != ConversationStatus::Active {
            debug!(conversation_id, "conversation no longer active, skipping turn");
            return Ok(None);
        }
        let newer = self
            .storage
            .list_messages(conversation_id, after_sequence, 1)
            .await?;
        if !newer.is_empty() {
            debug!(conversation_id, after_sequence, "turn already taken, skipping");
            return Ok(None);
        }

        let speaker_party = Party::Agent(speaker_agent_id.to_string());
        let Some(counterpart) = conversation.counterpart(&speaker_party).cloned() else {
            return Err(TwinlinkError::InvalidParticipants(format!(
                "{speaker_party} is not a party of conversation {conversation_id}"
            )));
        };
        let speaker = self
            .storage
            .get_agent(speaker_agent_id)
            .await?
            .ok_or_else(|| TwinlinkError::NotFound {
                entity: "agent",
                id: speaker_agent_id.to_string(),
            })?;
        let counterpart_name = self.display_name(&counterpart).await?;
        let transcript = self
            .storage
            .list_messages(
                conversation_id,
                (after_sequence - TRANSCRIPT_WINDOW).max(0),
                TRANSCRIPT_WINDOW,
            )
            .await?;

        let generated = generator
            .generate_turn(TurnRequest {
                conversation_id: conversation_id.to_string(),
                speaker,
                counterpart_name,
                counterpart,
                transcript,
                termination_marker: self.config.termination_marker.clone(),
                remaining_turns: conversation
                    .max_turns
                    .map(|max| (max - conversation.turn_count).max(0)),
            })
            .await?;

        let (content, concludes) =
            strip_marker(&generated.content, &self.config.termination_marker);
        let message = NewMessage {
            sender: speaker_party,
            kind: MessageKind::Text,
            content,
            metadata: compatibility_metadata(generated.compatibility),
            concludes,
            replaces_id: None,
        };
        match self.append_turn(conversation_id, message).await {
            Ok(appended) => Ok(Some(appended)),
            // Ended by a sweep or a participant while the turn was generated.
            Err(TwinlinkError::ConversationNotActive { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// End a conversation on behalf of a participant.
    pub async fn close(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<Conversation, TwinlinkError> {
        let conversation = self.get(conversation_id, user_id).await?;
        self.end(&conversation, EndReason::Closed, None).await
    }

    /// Force-end an active conversation as failed.
    pub async fn fail(
        &self,
        conversation_id: &str,
        error: &str,
    ) -> Result<Option<Conversation>, TwinlinkError> {
        let ended = self
            .storage
            .end_conversation(
                conversation_id,
                EndReason::Failed,
                Some(error),
                &format_timestamp(Utc::now()),
            )
            .await?;
        if let Some(conversation) = &ended {
            warn!(conversation_id, error, "conversation failed");
            self.finalize(conversation).await;
        }
        Ok(ended)
    }

    pub async fn archive(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<Conversation, TwinlinkError> {
        self.get(conversation_id, user_id).await?;
        self.storage
            .set_conversation_archived(conversation_id, true, &format_timestamp(Utc::now()))
            .await
    }

    /// Back to `ended`, never to `active`.
    pub async fn unarchive(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<Conversation, TwinlinkError> {
        self.get(conversation_id, user_id).await?;
        self.storage
            .set_conversation_archived(conversation_id, false, &format_timestamp(Utc::now()))
            .await
    }

    /// A conversation as seen by a participating user, directly or through
    /// one of their agents. Others get `NotFound`.
    pub async fn get(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<Conversation, TwinlinkError> {
        let conversation = self.require_conversation(conversation_id).await?;
        let parties = [conversation.party_a.clone(), conversation.party_b.clone()];
        for party in &parties {
            if self.represents(party, user_id).await? {
                return Ok(conversation);
            }
        }
        Err(TwinlinkError::NotFound {
            entity: "conversation",
            id: conversation_id.to_string(),
        })
    }

    pub async fn messages(
        &self,
        conversation_id: &str,
        user_id: &str,
        after_sequence: i64,
        limit: i64,
    ) -> Result<Vec<Message>, TwinlinkError> {
        self.get(conversation_id, user_id).await?;
        self.storage
            .list_messages(conversation_id, after_sequence, limit)
            .await
    }

    pub async fn list_for_user(
        &self,
        user_id: &str,
        page: Page,
    ) -> Result<Vec<Conversation>, TwinlinkError> {
        self.storage.list_conversations_for_user(user_id, page).await
    }

    /// End every active conversation idle for longer than the inactivity
    /// timeout.
    pub async fn end_inactive(&self) -> Result<Vec<Conversation>, TwinlinkError> {
        let now = Utc::now();
        let timeout = chrono::Duration::seconds(
            i64::try_from(self.config.inactivity_timeout_secs).unwrap_or(i64::MAX / 1000),
        );
        let cutoff = now
            .checked_sub_signed(timeout)
            .map(format_timestamp)
            .unwrap_or_default();
        let stale = self.storage.stale_conversations(&cutoff).await?;

        let at = format_timestamp(now);
        let mut ended = Vec::with_capacity(stale.len());
        for conversation in stale {
            if let Some(done) = self
                .storage
                .end_conversation(&conversation.id, EndReason::InactivityTimeout, None, &at)
                .await?
            {
                self.finalize(&done).await;
                ended.push(done);
            }
        }
        if !ended.is_empty() {
            info!(count = ended.len(), "inactive conversations ended");
        }
        Ok(ended)
    }

    async fn end(
        &self,
        conversation: &Conversation,
        reason: EndReason,
        failure: Option<&str>,
    ) -> Result<Conversation, TwinlinkError> {
        let ended = self
            .storage
            .end_conversation(&conversation.id, reason, failure, &format_timestamp(Utc::now()))
            .await?
            .ok_or_else(|| TwinlinkError::ConversationNotActive {
                conversation_id: conversation.id.clone(),
                status: conversation.status,
            })?;
        self.finalize(&ended).await;
        Ok(ended)
    }

    /// Post-commit work for a conversation that just ended. Failures here
    /// are logged; the end itself is already durable.
    async fn finalize(&self, conversation: &Conversation) {
        let end_reason = conversation.end_reason.unwrap_or(EndReason::Closed);
        metrics::counter!("twinlink_conversations_ended_total", "reason" => end_reason.to_string())
            .increment(1);
        info!(
            conversation_id = %conversation.id,
            reason = %end_reason,
            turns = conversation.turn_count,
            "conversation ended"
        );

        let compatibility = match self
            .storage
            .list_messages(&conversation.id, 0, FULL_TRANSCRIPT)
            .await
        {
            Ok(messages) => mean_compatibility(&messages),
            Err(e) => {
                warn!(
                    conversation_id = %conversation.id,
                    error = %e,
                    "could not read transcript for outcome"
                );
                None
            }
        };
        let outcome = ConversationOutcome {
            conversation_id: conversation.id.clone(),
            match_id: conversation.match_id.clone(),
            end_reason,
            turns: conversation.turn_count,
            compatibility,
        };
        if let Err(e) = self.outcomes.conversation_concluded(outcome).await {
            warn!(conversation_id = %conversation.id, error = %e, "outcome delivery failed");
        }
        self.emit(DomainEvent::ConversationEnded(conversation.clone()))
            .await;
    }

    /// Enqueue the counterpart agent's reply to a text message.
    async fn schedule_reply(&self, appended: &AppendedTurn) -> Result<(), TwinlinkError> {
        if appended.message.kind != MessageKind::Text {
            return Ok(());
        }
        let Some(Party::Agent(next)) = appended.conversation.counterpart(&appended.message.sender)
        else {
            return Ok(());
        };
        self.enqueue_turn(&appended.conversation.id, next, appended.message.sequence)
            .await
    }

    async fn enqueue_turn(
        &self,
        conversation_id: &str,
        speaker: &str,
        after_sequence: i64,
    ) -> Result<(), TwinlinkError> {
        self.queue
            .enqueue(
                job_kinds::CONVERSATION_TURN,
                json!({
                    "conversation_id": conversation_id,
                    "speaker": speaker,
                    "after_sequence": after_sequence,
                }),
                None,
            )
            .await?;
        Ok(())
    }

    async fn require_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Conversation, TwinlinkError> {
        self.storage
            .get_conversation(conversation_id)
            .await?
            .ok_or_else(|| TwinlinkError::NotFound {
                entity: "conversation",
                id: conversation_id.to_string(),
            })
    }

    async fn require_active_party(&self, party: &Party) -> Result<(), TwinlinkError> {
        let active = match party {
            Party::User(id) => self.storage.get_user(id).await?.is_some_and(|u| u.is_active),
            Party::Agent(id) => self.storage.get_agent(id).await?.is_some_and(|a| a.is_active),
        };
        if active {
            Ok(())
        } else {
            Err(TwinlinkError::InvalidParticipants(format!(
                "{party} does not exist or is inactive"
            )))
        }
    }

    /// True if `user_id` is the party or owns the party's agent.
    async fn represents(&self, party: &Party, user_id: &str) -> Result<bool, TwinlinkError> {
        Ok(match party {
            Party::User(id) => id == user_id,
            Party::Agent(id) => self
                .storage
                .get_agent(id)
                .await?
                .is_some_and(|a| a.user_id == user_id),
        })
    }

    async fn display_name(&self, party: &Party) -> Result<String, TwinlinkError> {
        Ok(match party {
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

    async fn emit(&self, event: DomainEvent) {
        let name = event.name();
        if let Err(e) = self.events.emit(event).await {
            warn!(event = name, error = %e, "event delivery failed");
        }
    }
}
