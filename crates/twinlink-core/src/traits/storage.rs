// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter trait for the persistence backend.

use async_trait::async_trait;

use crate::error::TwinlinkError;
use crate::traits::adapter::PluginAdapter;
use crate::traits::profile::ProfileStore;
use crate::types::{
    Agent, AppendedTurn, BackgroundJob, Conversation, Decision, Embedding, EndReason, JobStatus,
    Match, MatchInsert, MatchStatus, Message, NewMessage, Notification, Page, PrivacySettings,
    User,
};

/// Adapter for the persistence backend.
///
/// Every method that changes more than one row does so in a single
/// transaction. Methods that enforce a lifecycle rule return the matching
/// validation error and leave state untouched.
#[async_trait]
pub trait StorageAdapter: ProfileStore + PluginAdapter {
    /// Opens the backend and applies pending migrations.
    async fn initialize(&self) -> Result<(), TwinlinkError>;

    /// Closes the backend, flushing pending writes.
    async fn close(&self) -> Result<(), TwinlinkError>;

    // --- profiles ---

    async fn create_user(&self, user: &User) -> Result<(), TwinlinkError>;

    async fn set_user_active(&self, user_id: &str, active: bool) -> Result<(), TwinlinkError>;

    async fn set_user_privacy(
        &self,
        user_id: &str,
        privacy: PrivacySettings,
    ) -> Result<(), TwinlinkError>;

    async fn create_agent(&self, agent: &Agent) -> Result<(), TwinlinkError>;

    /// Makes `agent_id` the active agent of its owner, deactivating any other.
    async fn activate_agent(&self, agent_id: &str) -> Result<Agent, TwinlinkError>;

    async fn deactivate_agent(&self, agent_id: &str) -> Result<(), TwinlinkError>;

    // --- embeddings ---

    /// Stores a new current embedding, superseding the previous one.
    async fn save_embedding(&self, embedding: &Embedding) -> Result<(), TwinlinkError>;

    async fn current_embedding(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Option<Embedding>, TwinlinkError>;

    /// Current agent embeddings whose agent is active and whose owner is
    /// active and discoverable.
    async fn discoverable_agent_embeddings(&self) -> Result<Vec<Embedding>, TwinlinkError>;

    /// All embeddings of an entity, newest first, superseded ones included.
    async fn embedding_history(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<Embedding>, TwinlinkError>;

    // --- matches ---

    /// Inserts `proposal` unless a non-expired match already exists for
    /// the same unordered user pair.
    async fn create_match_if_absent(&self, proposal: &Match)
        -> Result<MatchInsert, TwinlinkError>;

    async fn get_match(&self, match_id: &str) -> Result<Option<Match>, TwinlinkError>;

    async fn list_matches_for_user(
        &self,
        user_id: &str,
        status: Option<MatchStatus>,
        page: Page,
    ) -> Result<Vec<Match>, TwinlinkError>;

    /// Users that `user_id` shares a non-expired match with.
    async fn open_match_counterparts(&self, user_id: &str) -> Result<Vec<String>, TwinlinkError>;

    /// Records one side's decision and resolves the match status.
    async fn record_match_response(
        &self,
        match_id: &str,
        user_id: &str,
        decision: Decision,
        at: &str,
    ) -> Result<Match, TwinlinkError>;

    /// Moves every pending match with `expires_at <= now` to expired.
    async fn expire_matches(&self, now: &str) -> Result<Vec<Match>, TwinlinkError>;

    async fn set_match_reason(&self, match_id: &str, reason: &str) -> Result<(), TwinlinkError>;

    /// Replaces the score of a still-pending match. Returns false otherwise.
    async fn update_pending_match_score(
        &self,
        match_id: &str,
        score: f64,
    ) -> Result<bool, TwinlinkError>;

    // --- conversations ---

    /// Inserts an active conversation. When it belongs to a match, the match
    /// is linked in the same transaction; if the match is closed or already
    /// linked nothing is written and the result is false.
    async fn create_conversation(&self, conversation: &Conversation)
        -> Result<bool, TwinlinkError>;

    async fn get_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Option<Conversation>, TwinlinkError>;

    /// Conversations where the user or one of the user's agents takes part.
    async fn list_conversations_for_user(
        &self,
        user_id: &str,
        page: Page,
    ) -> Result<Vec<Conversation>, TwinlinkError>;

    /// Appends a message with the next sequence number and ends the
    /// conversation when it concludes or reaches its turn limit.
    async fn append_message(
        &self,
        conversation_id: &str,
        message: &NewMessage,
        at: &str,
    ) -> Result<AppendedTurn, TwinlinkError>;

    async fn list_messages(
        &self,
        conversation_id: &str,
        after_sequence: i64,
        limit: i64,
    ) -> Result<Vec<Message>, TwinlinkError>;

    /// Ends an active conversation. Returns `None` if it was not active.
    async fn end_conversation(
        &self,
        conversation_id: &str,
        reason: EndReason,
        failure: Option<&str>,
        at: &str,
    ) -> Result<Option<Conversation>, TwinlinkError>;

    /// Moves between `ended` and `archived`.
    async fn set_conversation_archived(
        &self,
        conversation_id: &str,
        archived: bool,
        at: &str,
    ) -> Result<Conversation, TwinlinkError>;

    /// Active conversations whose last activity is at or before `cutoff`.
    async fn stale_conversations(&self, cutoff: &str)
        -> Result<Vec<Conversation>, TwinlinkError>;

    // --- jobs ---

    async fn insert_job(&self, job: &BackgroundJob) -> Result<(), TwinlinkError>;

    /// Atomically leases the oldest runnable job.
    async fn claim_next_job(
        &self,
        now: &str,
        lease_until: &str,
    ) -> Result<Option<BackgroundJob>, TwinlinkError>;

    /// Leases a running job whose lease lapsed with no retries left. The
    /// caller fails it permanently.
    async fn claim_expired_job(
        &self,
        now: &str,
        lease_until: &str,
    ) -> Result<Option<BackgroundJob>, TwinlinkError>;

    async fn update_job_progress(&self, job_id: &str, progress: u8) -> Result<(), TwinlinkError>;

    async fn complete_job(
        &self,
        job_id: &str,
        result: &serde_json::Value,
        at: &str,
    ) -> Result<(), TwinlinkError>;

    /// Records a failed attempt. With `retry_at` set and retries left the
    /// job moves to retrying, otherwise to failed.
    async fn fail_job(
        &self,
        job_id: &str,
        error: &str,
        retry_at: Option<&str>,
        at: &str,
    ) -> Result<BackgroundJob, TwinlinkError>;

    async fn get_job(&self, job_id: &str) -> Result<Option<BackgroundJob>, TwinlinkError>;

    async fn list_jobs(
        &self,
        owner_user_id: Option<&str>,
        status: Option<JobStatus>,
        limit: i64,
    ) -> Result<Vec<BackgroundJob>, TwinlinkError>;

    // --- notifications ---

    async fn insert_notification(&self, notification: &Notification)
        -> Result<(), TwinlinkError>;

    async fn list_notifications(
        &self,
        user_id: &str,
        unread_only: bool,
        page: Page,
    ) -> Result<Vec<Notification>, TwinlinkError>;

    async fn unread_notification_count(&self, user_id: &str) -> Result<i64, TwinlinkError>;

    /// Returns false if no such notification belongs to the user.
    async fn mark_notification_read(
        &self,
        user_id: &str,
        notification_id: &str,
        at: &str,
    ) -> Result<bool, TwinlinkError>;

    async fn mark_all_notifications_read(&self, user_id: &str, at: &str)
        -> Result<usize, TwinlinkError>;

    /// Deletes read notifications created before `older_than`.
    async fn purge_read_notifications(&self, older_than: &str) -> Result<usize, TwinlinkError>;
}
