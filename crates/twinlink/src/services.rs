// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Production wiring of storage, adapters, engines and job handlers.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use twinlink_config::TwinlinkConfig;
use twinlink_conversation::{
    ConversationOrchestrator, InactivitySweepHandler, StartConversationHandler, TurnHandler,
};
use twinlink_core::types::job_kinds;
use twinlink_core::{
    EmbeddingAdapter, EventSink, GenerationAdapter, PluginAdapter, StorageAdapter, TwinlinkError,
};
use twinlink_match::{
    DiscoverHandler, DiscoverySweepHandler, ExpireHandler, MatchEngine, ReasonHandler,
};
use twinlink_notify::{ChannelHub, NotificationGateway, NotifyingSink, PurgeNotificationsHandler};
use twinlink_openai::{OpenAiEmbedder, OpenAiGenerator};
use twinlink_scheduler::{JobQueue, Sweeper, WorkerPool};
use twinlink_similarity::{EmbedAgentHandler, EmbeddingService, SqliteSimilarityIndex};
use twinlink_storage::SqliteStorage;

/// Everything a running process needs, built once from configuration.
pub struct Services {
    pub storage: Arc<dyn StorageAdapter>,
    pub queue: JobQueue,
    pub matches: Arc<MatchEngine>,
    pub conversations: Arc<ConversationOrchestrator>,
    pub notifications: Arc<NotificationGateway>,
    pub workers: Arc<WorkerPool>,
    /// Every backend adapter, checked by `/health` and shut down on exit.
    pub adapters: Vec<Arc<dyn PluginAdapter>>,
}

/// Open the database and apply pending migrations.
pub async fn open_storage(config: &TwinlinkConfig) -> Result<Arc<SqliteStorage>, TwinlinkError> {
    let storage = SqliteStorage::new(config.storage.clone());
    storage.initialize().await?;
    info!(path = %config.storage.database_path, "storage initialized");
    Ok(Arc::new(storage))
}

impl Services {
    /// Build the service graph with the OpenAI-compatible adapters.
    pub async fn build(config: &TwinlinkConfig) -> Result<Self, TwinlinkError> {
        let storage = open_storage(config).await?;
        let embedder = Arc::new(OpenAiEmbedder::new(&config.embedding)?);
        let generator = Arc::new(OpenAiGenerator::new(&config.generation)?);
        let adapters: Vec<Arc<dyn PluginAdapter>> =
            vec![storage.clone(), embedder.clone(), generator.clone()];
        for adapter in &adapters {
            info!(
                adapter = adapter.name(),
                kind = %adapter.adapter_type(),
                version = %adapter.version(),
                "adapter ready"
            );
        }
        Ok(Self::assemble(config, storage, embedder, generator, adapters))
    }

    /// Wire engines and register one handler per job kind.
    pub fn assemble(
        config: &TwinlinkConfig,
        storage: Arc<dyn StorageAdapter>,
        embedder: Arc<dyn EmbeddingAdapter>,
        generator: Arc<dyn GenerationAdapter>,
        adapters: Vec<Arc<dyn PluginAdapter>>,
    ) -> Self {
        let queue = JobQueue::new(storage.clone(), config.scheduler.max_retries);
        let index = Arc::new(SqliteSimilarityIndex::new(storage.clone()));
        let hub = Arc::new(ChannelHub::new(config.notification.channel_buffer));
        let notifications = Arc::new(NotificationGateway::new(storage.clone(), hub));
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
        let embeddings = Arc::new(EmbeddingService::new(storage.clone(), embedder, index));

        let mut workers = WorkerPool::new(queue.clone(), &config.scheduler);
        workers.register(Arc::new(EmbedAgentHandler::new(embeddings, queue.clone())));
        workers.register(Arc::new(DiscoverHandler::new(matches.clone())));
        workers.register(Arc::new(DiscoverySweepHandler::new(storage.clone(), queue.clone())));
        workers.register(Arc::new(ExpireHandler::new(matches.clone())));
        workers.register(Arc::new(ReasonHandler::new(storage.clone(), generator.clone())));
        workers.register(Arc::new(StartConversationHandler::new(
            conversations.clone(),
            storage.clone(),
        )));
        workers.register(Arc::new(TurnHandler::new(conversations.clone(), generator)));
        workers.register(Arc::new(InactivitySweepHandler::new(conversations.clone())));
        workers.register(Arc::new(PurgeNotificationsHandler::new(
            notifications.clone(),
            config.notification.retention_days,
        )));

        Self {
            storage,
            queue,
            matches,
            conversations,
            notifications,
            workers: Arc::new(workers.with_events(events)),
            adapters,
        }
    }

    /// Shut every adapter down, last built first. Failures are logged so
    /// the rest still run.
    pub async fn shutdown(&self) {
        for adapter in self.adapters.iter().rev() {
            if let Err(e) = adapter.shutdown().await {
                warn!(adapter = adapter.name(), error = %e, "adapter shutdown failed");
            }
        }
    }

    /// Periodic sweeps at their configured intervals.
    pub fn sweeper(&self, config: &TwinlinkConfig) -> Sweeper {
        Sweeper::new(self.queue.clone())
            .every(
                job_kinds::DISCOVERY_SWEEP,
                Duration::from_secs(config.matching.discovery_interval_secs),
            )
            .every(
                job_kinds::EXPIRE_MATCHES,
                Duration::from_secs(config.matching.expiry_sweep_interval_secs),
            )
            .every(
                job_kinds::INACTIVITY_SWEEP,
                Duration::from_secs(config.conversation.sweep_interval_secs),
            )
            .every(
                job_kinds::PURGE_NOTIFICATIONS,
                Duration::from_secs(config.notification.purge_interval_secs),
            )
    }
}
