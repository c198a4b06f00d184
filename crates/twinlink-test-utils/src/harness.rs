// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles the complete service stack with mock adapters
//! and a temp SQLite database. Background work only runs when a test calls
//! [`TestHarness::drain_jobs`], which keeps scenarios deterministic.

use std::sync::Arc;

use twinlink_config::model::{StorageConfig, TwinlinkConfig};
use twinlink_conversation::{
    ConversationOrchestrator, InactivitySweepHandler, StartConversationHandler, TurnHandler,
};
use twinlink_core::types::{Agent, job_kinds};
use twinlink_core::{EventSink, PluginAdapter, StorageAdapter, TwinlinkError};
use twinlink_match::{
    DiscoverHandler, DiscoverySweepHandler, ExpireHandler, MatchEngine, ReasonHandler,
};
use twinlink_notify::{ChannelHub, NotificationGateway, NotifyingSink, PurgeNotificationsHandler};
use twinlink_scheduler::{JobQueue, WorkerPool};
use twinlink_similarity::{EmbedAgentHandler, EmbeddingService, SqliteSimilarityIndex};
use twinlink_storage::SqliteStorage;
use twinlink_storage::testing::seed_users_with_agents;

use crate::mock_embedder::MockEmbedder;
use crate::mock_generator::MockGenerator;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    config: TwinlinkConfig,
    replies: Vec<String>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            config: TwinlinkConfig::default(),
            replies: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: TwinlinkConfig) -> Self {
        self.config = config;
        self
    }

    /// Queue generated turn replies, in order.
    pub fn with_replies(mut self, replies: Vec<String>) -> Self {
        self.replies = replies;
        self
    }

    pub async fn build(self) -> Result<TestHarness, TwinlinkError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| TwinlinkError::Storage { source: e.into() })?;
        let db_path = temp_dir.path().join("twinlink-test.db");

        let mut config = self.config;
        config.storage = StorageConfig {
            database_path: db_path.to_string_lossy().to_string(),
            ..config.storage
        };
        let sqlite = Arc::new(SqliteStorage::new(config.storage.clone()));
        sqlite.initialize().await?;
        let storage: Arc<dyn StorageAdapter> = sqlite.clone();

        let embedder = Arc::new(MockEmbedder::new());
        let generator = Arc::new(if self.replies.is_empty() {
            MockGenerator::new()
        } else {
            MockGenerator::with_replies(self.replies)
        });

        let adapters: Vec<Arc<dyn PluginAdapter>> =
            vec![sqlite, embedder.clone(), generator.clone()];

        let queue = JobQueue::new(storage.clone(), config.scheduler.max_retries);
        let index = Arc::new(SqliteSimilarityIndex::new(storage.clone()));
        let hub = Arc::new(ChannelHub::new(config.notification.channel_buffer));
        let notifications = Arc::new(NotificationGateway::new(storage.clone(), hub.clone()));
        let events: Arc<dyn EventSink> =
            Arc::new(NotifyingSink::new(notifications.clone(), storage.clone()));

        let matches = Arc::new(MatchEngine::new(
            storage.clone(),
            index.clone(),
            queue.clone(),
            events.clone(),
            config.matching.clone(),
        ));
        let conversations = Arc::new(ConversationOrchestrator::new(
            storage.clone(),
            queue.clone(),
            events.clone(),
            matches.clone(),
            config.conversation.clone(),
        ));
        let embeddings = Arc::new(EmbeddingService::new(
            storage.clone(),
            embedder.clone(),
            index.clone(),
        ));

        let mut workers = WorkerPool::new(queue.clone(), &config.scheduler);
        workers.register(Arc::new(EmbedAgentHandler::new(embeddings.clone(), queue.clone())));
        workers.register(Arc::new(DiscoverHandler::new(matches.clone())));
        workers.register(Arc::new(DiscoverySweepHandler::new(storage.clone(), queue.clone())));
        workers.register(Arc::new(ExpireHandler::new(matches.clone())));
        workers.register(Arc::new(ReasonHandler::new(storage.clone(), generator.clone())));
        workers.register(Arc::new(StartConversationHandler::new(
            conversations.clone(),
            storage.clone(),
        )));
        workers.register(Arc::new(TurnHandler::new(conversations.clone(), generator.clone())));
        workers.register(Arc::new(InactivitySweepHandler::new(conversations.clone())));
        workers.register(Arc::new(PurgeNotificationsHandler::new(
            notifications.clone(),
            config.notification.retention_days,
        )));
        let workers = Arc::new(workers.with_events(events));

        Ok(TestHarness {
            config,
            storage,
            adapters,
            queue,
            embedder,
            generator,
            index,
            embeddings,
            hub,
            notifications,
            matches,
            conversations,
            workers,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete test environment with mock adapters and temp storage.
pub struct TestHarness {
    pub config: TwinlinkConfig,
    pub storage: Arc<dyn StorageAdapter>,
    /// Storage and the mock adapters, for health reporting.
    pub adapters: Vec<Arc<dyn PluginAdapter>>,
    pub queue: JobQueue,
    pub embedder: Arc<MockEmbedder>,
    pub generator: Arc<MockGenerator>,
    pub index: Arc<SqliteSimilarityIndex>,
    pub embeddings: Arc<EmbeddingService>,
    pub hub: Arc<ChannelHub>,
    pub notifications: Arc<NotificationGateway>,
    pub matches: Arc<MatchEngine>,
    pub conversations: Arc<ConversationOrchestrator>,
    pub workers: Arc<WorkerPool>,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Create users `ids`, each with an active agent `agent-{id}` whose
    /// embedding will be `vector`.
    pub async fn seed(&self, users: &[(&str, Vec<f32>)]) -> Result<Vec<Agent>, TwinlinkError> {
        let ids: Vec<&str> = users.iter().map(|(id, _)| *id).collect();
        let agents = seed_users_with_agents(self.storage.as_ref(), &ids).await?;
        for (agent, (_, vector)) in agents.iter().zip(users) {
            self.embedder.set_vector(&agent.id, vector.clone()).await;
        }
        Ok(agents)
    }

    /// Embed every active agent without chaining discovery.
    pub async fn embed_all(&self) -> Result<(), TwinlinkError> {
        for agent in self.storage.list_active_agents().await? {
            self.queue
                .enqueue(
                    job_kinds::EMBED_AGENT,
                    serde_json::json!({ "agent_id": agent.id, "discover": false }),
                    Some(&agent.user_id),
                )
                .await?;
        }
        self.drain_jobs().await?;
        Ok(())
    }

    /// Run every runnable job, including follow-ups, until the queue is idle.
    pub async fn drain_jobs(&self) -> Result<usize, TwinlinkError> {
        let executed = self.workers.drain().await?;
        tracing::debug!(executed, "harness drained jobs");
        Ok(executed)
    }
}
