// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the storage traits.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use twinlink_config::model::StorageConfig;
use twinlink_core::types::{
    Agent, AppendedTurn, BackgroundJob, Conversation, Decision, Embedding, EndReason, JobStatus,
    Match, MatchInsert, MatchStatus, Message, NewMessage, Notification, Page, PrivacySettings,
    User,
};
use twinlink_core::{
    AdapterType, HealthStatus, PluginAdapter, ProfileStore, StorageAdapter, TwinlinkError,
};

use crate::database::{Database, OpenOptions, map_tr_err};
use crate::queries::{conversations, embeddings, jobs, matches, notifications, profiles};

/// SQLite-backed storage. The database opens on
/// [`StorageAdapter::initialize`].
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Storage over an already opened database, e.g. an in-memory one.
    pub fn from_database(db: Database) -> Self {
        Self {
            config: StorageConfig {
                database_path: ":memory:".to_string(),
                ..StorageConfig::default()
            },
            db: OnceCell::new_with(Some(db)),
        }
    }

    fn db(&self) -> Result<&Database, TwinlinkError> {
        self.db
            .get()
            .ok_or_else(|| {
                TwinlinkError::storage("storage not initialized, call initialize() first")
            })
    }

    async fn checkpoint(db: &Database) -> Result<(), TwinlinkError> {
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, TwinlinkError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> { conn.execute_batch("SELECT 1;") })
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), TwinlinkError> {
        match self.db.get() {
            Some(db) => Self::checkpoint(db).await,
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ProfileStore for SqliteStorage {
    async fn get_user(&self, id: &str) -> Result<Option<User>, TwinlinkError> {
        profiles::get_user(self.db()?, id).await
    }

    async fn get_agent(&self, id: &str) -> Result<Option<Agent>, TwinlinkError> {
        profiles::get_agent(self.db()?, id).await
    }

    async fn list_active_agents(&self) -> Result<Vec<Agent>, TwinlinkError> {
        profiles::list_active_agents(self.db()?).await
    }

    async fn active_agent_for_user(&self, user_id: &str) -> Result<Option<Agent>, TwinlinkError> {
        profiles::active_agent_for_user(self.db()?, user_id).await
    }

    async fn agent_ids_for_users(
        &self,
        user_ids: &[String],
    ) -> Result<Vec<String>, TwinlinkError> {
        profiles::agent_ids_for_users(self.db()?, user_ids).await
    }

    async fn record_agent_conversation(
        &self,
        agent_id: &str,
        at: &str,
    ) -> Result<(), TwinlinkError> {
        profiles::record_agent_conversation(self.db()?, agent_id, at).await
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), TwinlinkError> {
        let options = OpenOptions {
            wal_mode: self.config.wal_mode,
            busy_timeout: Duration::from_millis(self.config.busy_timeout_ms),
        };
        let db = Database::open_with(&self.config.database_path, options).await?;
        self.db
            .set(db)
            .map_err(|_| TwinlinkError::storage("storage already initialized"))?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), TwinlinkError> {
        self.db()?.close().await
    }

    // --- profiles ---

    async fn create_user(&self, user: &User) -> Result<(), TwinlinkError> {
        profiles::create_user(self.db()?, user).await
    }

    async fn set_user_active(&self, user_id: &str, active: bool) -> Result<(), TwinlinkError> {
        profiles::set_user_active(self.db()?, user_id, active).await
    }

    async fn set_user_privacy(
        &self,
        user_id: &str,
        privacy: PrivacySettings,
    ) -> Result<(), TwinlinkError> {
        profiles::set_user_privacy(self.db()?, user_id, privacy).await
    }

    async fn create_agent(&self, agent: &Agent) -> Result<(), TwinlinkError> {
        profiles::create_agent(self.db()?, agent).await
    }

    async fn activate_agent(&self, agent_id: &str) -> Result<Agent, TwinlinkError> {
        profiles::activate_agent(self.db()?, agent_id).await
    }

    async fn deactivate_agent(&self, agent_id: &str) -> Result<(), TwinlinkError> {
        profiles::deactivate_agent(self.db()?, agent_id).await
    }

    // --- embeddings ---

    async fn save_embedding(&self, embedding: &Embedding) -> Result<(), TwinlinkError> {
        embeddings::save_embedding(self.db()?, embedding).await
    }

    async fn current_embedding(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Option<Embedding>, TwinlinkError> {
        embeddings::current_embedding(self.db()?, entity_type, entity_id).await
    }

    async fn discoverable_agent_embeddings(&self) -> Result<Vec<Embedding>, TwinlinkError> {
        embeddings::discoverable_agent_embeddings(self.db()?).await
    }

    async fn embedding_history(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<Embedding>, TwinlinkError> {
        embeddings::embedding_history(self.db()?, entity_type, entity_id).await
    }

    // --- matches ---

    async fn create_match_if_absent(&self, proposal: &Match) -> Result<MatchInsert, TwinlinkError> {
        matches::create_match_if_absent(self.db()?, proposal).await
    }

    async fn get_match(&self, match_id: &str) -> Result<Option<Match>, TwinlinkError> {
        matches::get_match(self.db()?, match_id).await
    }

    async fn list_matches_for_user(
        &self,
        user_id: &str,
        status: Option<MatchStatus>,
        page: Page,
    ) -> Result<Vec<Match>, TwinlinkError> {
        matches::list_matches_for_user(self.db()?, user_id, status, page).await
    }

    async fn open_match_counterparts(&self, user_id: &str) -> Result<Vec<String>, TwinlinkError> {
        matches::open_match_counterparts(self.db()?, user_id).await
    }

    async fn record_match_response(
        &self,
        match_id: &str,
        user_id: &str,
        decision: Decision,
        at: &str,
    ) -> Result<Match, TwinlinkError> {
        matches::record_match_response(self.db()?, match_id, user_id, decision, at).await
    }

    async fn expire_matches(&self, now: &str) -> Result<Vec<Match>, TwinlinkError> {
        matches::expire_matches(self.db()?, now).await
    }

    async fn set_match_reason(&self, match_id: &str, reason: &str) -> Result<(), TwinlinkError> {
        matches::set_match_reason(self.db()?, match_id, reason).await
    }

    async fn update_pending_match_score(
        &self,
        match_id: &str,
        score: f64,
    ) -> Result<bool, TwinlinkError> {
        matches::update_pending_match_score(self.db()?, match_id, score).await
    }

    // --- conversations ---

    async fn create_conversation(
        &self,
        conversation: &Conversation,
    ) -> Result<bool, TwinlinkError> {
        conversations::create_conversation(self.db()?, conversation).await
    }

    async fn get_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Option<Conversation>, TwinlinkError> {
        conversations::get_conversation(self.db()?, conversation_id).await
    }

    async fn list_conversations_for_user(
        &self,
        user_id: &str,
        page: Page,
    ) -> Result<Vec<Conversation>, TwinlinkError> {
        conversations::list_conversations_for_user(self.db()?, user_id, page).await
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        message: &NewMessage,
        at: &str,
    ) -> Result<AppendedTurn, TwinlinkError> {
        conversations::append_message(self.db()?, conversation_id, message, at).await
    }

    async fn list_messages(
        &self,
        conversation_id: &str,
        after_sequence: i64,
        limit: i64,
    ) -> Result<Vec<Message>, TwinlinkError> {
        conversations::list_messages(self.db()?, conversation_id, after_sequence, limit).await
    }

    async fn end_conversation(
        &self,
        conversation_id: &str,
        reason: EndReason,
        failure: Option<&str>,
        at: &str,
    ) -> Result<Option<Conversation>, TwinlinkError> {
        conversations::end_conversation(self.db()?, conversation_id, reason, failure, at).await
    }

    async fn set_conversation_archived(
        &self,
        conversation_id: &str,
        archived: bool,
        at: &str,
    ) -> Result<Conversation, TwinlinkError> {
        conversations::set_conversation_archived(self.db()?, conversation_id, archived, at).await
    }

    async fn stale_conversations(&self, cutoff: &str) -> Result<Vec<Conversation>, TwinlinkError> {
        conversations::stale_conversations(self.db()?, cutoff).await
    }

    // --- jobs ---

    async fn insert_job(&self, job: &BackgroundJob) -> Result<(), TwinlinkError> {
        jobs::insert_job(self.db()?, job).await
    }

    async fn claim_next_job(
        &self,
        now: &str,
        lease_until: &str,
    ) -> Result<Option<BackgroundJob>, TwinlinkError> {
        jobs::claim_next_job(self.db()?, now, lease_until).await
    }

    async fn claim_expired_job(
        &self,
        now: &str,
        lease_until: &str,
    ) -> Result<Option<BackgroundJob>, TwinlinkError> {
        jobs::claim_expired_job(self.db()?, now, lease_until).await
    }

    async fn update_job_progress(&self, job_id: &str, progress: u8) -> Result<(), TwinlinkError> {
        jobs::update_job_progress(self.db()?, job_id, progress).await
    }

    async fn complete_job(
        &self,
        job_id: &str,
        result: &serde_json::Value,
        at: &str,
    ) -> Result<(), TwinlinkError> {
        jobs::complete_job(self.db()?, job_id, result, at).await
    }

    async fn fail_job(
        &self,
        job_id: &str,
        error: &str,
        retry_at: Option<&str>,
        at: &str,
    ) -> Result<BackgroundJob, TwinlinkError> {
        jobs::fail_job(self.db()?, job_id, error, retry_at, at).await
    }

    async fn get_job(&self, job_id: &str) -> Result<Option<BackgroundJob>, TwinlinkError> {
        jobs::get_job(self.db()?, job_id).await
    }

    async fn list_jobs(
        &self,
        owner_user_id: Option<&str>,
        status: Option<JobStatus>,
        limit: i64,
    ) -> Result<Vec<BackgroundJob>, TwinlinkError> {
        jobs::list_jobs(self.db()?, owner_user_id, status, limit).await
    }

    // --- notifications ---

    async fn insert_notification(&self, notification: &Notification) -> Result<(), TwinlinkError> {
        notifications::insert_notification(self.db()?, notification).await
    }

    async fn list_notifications(
        &self,
        user_id: &str,
        unread_only: bool,
        page: Page,
    ) -> Result<Vec<Notification>, TwinlinkError> {
        notifications::list_notifications(self.db()?, user_id, unread_only, page).await
    }

    async fn unread_notification_count(&self, user_id: &str) -> Result<i64, TwinlinkError> {
        notifications::unread_notification_count(self.db()?, user_id).await
    }

    async fn mark_notification_read(
        &self,
        user_id: &str,
        notification_id: &str,
        at: &str,
    ) -> Result<bool, TwinlinkError> {
        notifications::mark_notification_read(self.db()?, user_id, notification_id, at).await
    }

    async fn mark_all_notifications_read(
        &self,
        user_id: &str,
        at: &str,
    ) -> Result<usize, TwinlinkError> {
        notifications::mark_all_notifications_read(self.db()?, user_id, at).await
    }

    async fn purge_read_notifications(&self, older_than: &str) -> Result<usize, TwinlinkError> {
        notifications::purge_read_notifications(self.db()?, older_than).await
    }
}
