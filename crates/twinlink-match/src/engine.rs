// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Match discovery and lifecycle.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};
use twinlink_config::model::MatchingConfig;
use twinlink_core::types::{
    AGENT_ENTITY, Agent, Decision, EndReason, Match, MatchInsert, MatchStatus, Page, User,
    format_timestamp, job_kinds,
};
use twinlink_core::{
    ConversationOutcome, DomainEvent, EventSink, OutcomeSink, SimilarityIndex, StorageAdapter,
    TwinlinkError,
};
use twinlink_scheduler::JobQueue;

use crate::score::{blend, score_from_distance};

/// Page size used when returning a user's pending matches after discovery.
const PENDING_LISTING: Page = Page {
    offset: 0,
    limit: 500,
};

/// Proposes, resolves, and expires matches.
pub struct MatchEngine {
    storage: Arc<dyn StorageAdapter>,
    index: Arc<dyn SimilarityIndex>,
    queue: JobQueue,
    events: Arc<dyn EventSink>,
    config: MatchingConfig,
}

impl MatchEngine {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        index: Arc<dyn SimilarityIndex>,
        queue: JobQueue,
        events: Arc<dyn EventSink>,
        config: MatchingConfig,
    ) -> Self {
        Self {
            storage,
            index,
            queue,
            events,
            config,
        }
    }

    /// Find new candidates for `user_id` and return all of the user's
    /// pending matches.
    pub async fn discover(&self, user_id: &str) -> Result<Vec<Match>, TwinlinkError> {
        let user = self.require_user(user_id).await?;
        if !user.is_active {
            debug!(user_id, "skipping discovery for inactive user");
            return self.pending_for(user_id).await;
        }
        let Some(agent) = self.storage.active_agent_for_user(user_id).await? else {
            debug!(user_id, "user has no active agent");
            return self.pending_for(user_id).await;
        };
        let Some(embedding) = self
            .storage
            .current_embedding(AGENT_ENTITY, &agent.id)
            .await?
        else {
            let job = self
                .queue
                .enqueue(
                    job_kinds::EMBED_AGENT,
                    json!({ "agent_id": agent.id }),
                    Some(user_id),
                )
                .await?;
            info!(
                user_id,
                agent_id = %agent.id,
                job_id = %job.id,
                "agent has no embedding, enqueued"
            );
            return self.pending_for(user_id).await;
        };

        let mut matched: HashSet<String> = self
            .storage
            .open_match_counterparts(user_id)
            .await?
            .into_iter()
            .collect();
        let mut owners = vec![user_id.to_string()];
        owners.extend(matched.iter().cloned());
        let exclude = self.storage.agent_ids_for_users(&owners).await?;

        let neighbors = self
            .index
            .query(&embedding.vector, &exclude, self.config.top_k)
            .await?;
        metrics::histogram!("twinlink_discovery_candidates").record(neighbors.len() as f64);

        let mut created = 0usize;
        for neighbor in neighbors {
            let score = score_from_distance(neighbor.distance);
            if score < self.config.min_score {
                continue;
            }
            let Some((candidate, owner)) =
                self.eligible_candidate(&user, &neighbor.entity_id).await?
            else {
                continue;
            };
            if matched.contains(&owner.id) {
                continue;
            }

            let proposal = self.proposal(&user, &agent, &owner, &candidate, score);
            match self.storage.create_match_if_absent(&proposal).await? {
                MatchInsert::Created(m) => {
                    matched.insert(owner.id.clone());
                    created += 1;
                    self.after_created(m).await?;
                }
                MatchInsert::Existing(m) => {
                    matched.insert(owner.id.clone());
                    debug!(match_id = %m.id, "pair already has an open match");
                }
            }
        }

        if created > 0 {
            info!(user_id, created, "matches proposed");
        }
        self.pending_for(user_id).await
    }

    /// Record `user_id`'s decision on a pending match.
    pub async fn respond(
        &self,
        match_id: &str,
        user_id: &str,
        decision: Decision,
    ) -> Result<Match, TwinlinkError> {
        let now = format_timestamp(Utc::now());
        let resolved = self
            .storage
            .record_match_response(match_id, user_id, decision, &now)
            .await?;
        metrics::counter!("twinlink_match_responses_total", "decision" => decision.to_string())
            .increment(1);

        match resolved.status {
            MatchStatus::Accepted => {
                info!(match_id, "match accepted by both users");
                self.emit(DomainEvent::MatchAccepted(resolved.clone())).await;
            }
            MatchStatus::Rejected => {
                info!(match_id, user_id, "match rejected");
                self.emit(DomainEvent::MatchRejected(resolved.clone())).await;
            }
            _ => debug!(match_id, user_id, "response recorded, awaiting other side"),
        }
        Ok(resolved)
    }

    /// Expire every pending match past its expiry time.
    pub async fn expire_due(&self) -> Result<Vec<Match>, TwinlinkError> {
        let expired = self
            .storage
            .expire_matches(&format_timestamp(Utc::now()))
            .await?;
        if !expired.is_empty() {
            metrics::counter!("twinlink_matches_expired_total").increment(expired.len() as u64);
            info!(count = expired.len(), "matches expired");
        }
        Ok(expired)
    }

    /// A match as seen by one of its participants.
    pub async fn get(&self, match_id: &str, user_id: &str) -> Result<Match, TwinlinkError> {
        let m = self
            .storage
            .get_match(match_id)
            .await?
            .ok_or_else(|| TwinlinkError::NotFound {
                entity: "match",
                id: match_id.to_string(),
            })?;
        if !m.involves(user_id) {
            return Err(TwinlinkError::NotParticipant {
                match_id: match_id.to_string(),
                user_id: user_id.to_string(),
            });
        }
        Ok(m)
    }

    pub async fn list(
        &self,
        user_id: &str,
        status: Option<MatchStatus>,
        page: Page,
    ) -> Result<Vec<Match>, TwinlinkError> {
        self.storage.list_matches_for_user(user_id, status, page).await
    }

    /// Fold a finished conversation's compatibility estimate into the score
    /// of its still-pending match.
    pub async fn apply_outcome(
        &self,
        outcome: &ConversationOutcome,
    ) -> Result<Option<f64>, TwinlinkError> {
        if outcome.end_reason == EndReason::Failed {
            return Ok(None);
        }
        let (Some(match_id), Some(estimate)) = (&outcome.match_id, outcome.compatibility) else {
            return Ok(None);
        };
        let Some(m) = self.storage.get_match(match_id).await? else {
            warn!(match_id = %match_id, "outcome references unknown match");
            return Ok(None);
        };
        if m.status != MatchStatus::Pending {
            return Ok(None);
        }
        let score = blend(m.score, estimate);
        if self.storage.update_pending_match_score(match_id, score).await? {
            info!(
                match_id = %match_id,
                old = m.score,
                new = score,
                "match score updated from conversation"
            );
            Ok(Some(score))
        } else {
            Ok(None)
        }
    }

    async fn require_user(&self, user_id: &str) -> Result<User, TwinlinkError> {
        self.storage
            .get_user(user_id)
            .await?
            .ok_or_else(|| TwinlinkError::NotFound {
                entity: "user",
                id: user_id.to_string(),
            })
    }

    async fn pending_for(&self, user_id: &str) -> Result<Vec<Match>, TwinlinkError> {
        self.storage
            .list_matches_for_user(user_id, Some(MatchStatus::Pending), PENDING_LISTING)
            .await
    }

    /// The candidate agent and its owner, if both may be matched with `user`.
    async fn eligible_candidate(
        &self,
        user: &User,
        agent_id: &str,
    ) -> Result<Option<(Agent, User)>, TwinlinkError> {
        let Some(candidate) = self.storage.get_agent(agent_id).await? else {
            return Ok(None);
        };
        if !candidate.is_active || candidate.user_id == user.id {
            return Ok(None);
        }
        let Some(owner) = self.storage.get_user(&candidate.user_id).await? else {
            return Ok(None);
        };
        if !owner.is_active || !owner.privacy.discoverable {
            return Ok(None);
        }
        Ok(Some((candidate, owner)))
    }

    fn proposal(
        &self,
        user: &User,
        agent: &Agent,
        owner: &User,
        candidate: &Agent,
        score: f64,
    ) -> Match {
        let now = Utc::now();
        let expires = now + chrono::Duration::days(self.config.expiry_days);
        let ((user1, agent1), (user2, agent2)) = if user.id < owner.id {
            ((&user.id, &agent.id), (&owner.id, &candidate.id))
        } else {
            ((&owner.id, &candidate.id), (&user.id, &agent.id))
        };
        let now = format_timestamp(now);
        Match {
            id: uuid::Uuid::new_v4().to_string(),
            user1_id: user1.clone(),
            user2_id: user2.clone(),
            agent1_id: agent1.clone(),
            agent2_id: agent2.clone(),
            score,
            reason: None,
            status: MatchStatus::Pending,
            user1_response: None,
            user2_response: None,
            conversation_id: None,
            expires_at: format_timestamp(expires),
            responded_at: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    async fn after_created(&self, m: Match) -> Result<(), TwinlinkError> {
        metrics::counter!("twinlink_matches_created_total").increment(1);
        debug!(match_id = %m.id, score = m.score, "match proposed");

        if self.config.generate_reasons {
            self.queue
                .enqueue(job_kinds::MATCH_REASON, json!({ "match_id": m.id }), None)
                .await?;
        }
        if self.config.auto_converse && m.score >= self.config.converse_min_score {
            self.queue
                .enqueue(job_kinds::START_CONVERSATION, json!({ "match_id": m.id }), None)
                .await?;
        }
        self.emit(DomainEvent::MatchProposed(m)).await;
        Ok(())
    }

    async fn emit(&self, event: DomainEvent) {
        let name = event.name();
        if let Err(e) = self.events.emit(event).await {
            warn!(event = name, error = %e, "event delivery failed");
        }
    }
}

#[async_trait]
impl OutcomeSink for MatchEngine {
    async fn conversation_concluded(
        &self,
        outcome: ConversationOutcome,
    ) -> Result<(), TwinlinkError> {
        self.apply_outcome(&outcome).await.map(|_| ())
    }
}
