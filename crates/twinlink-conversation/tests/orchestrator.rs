// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation lifecycle against in-memory storage and a scripted generator.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Mutex;
use twinlink_config::model::{ConversationConfig, SchedulerConfig};
use twinlink_conversation::{
    COMPATIBILITY_KEY, ConversationOrchestrator, InactivitySweepHandler, StartConversationHandler,
    TurnHandler,
};
use twinlink_core::traits::{GeneratedTurn, ReasonRequest, TurnRequest};
use twinlink_core::types::{
    ConversationKind, ConversationStatus, EndReason, JobStatus, Match, MatchStatus, NewMessage,
    Page, Party, job_kinds,
};
use twinlink_core::{
    AdapterType, ConversationOutcome, DomainEvent, EventSink, GenerationAdapter, HealthStatus,
    OutcomeSink, PluginAdapter, StorageAdapter, TwinlinkError,
};
use twinlink_scheduler::{JobQueue, WorkerPool};
use twinlink_storage::testing::{memory_storage, seed_users_with_agents};

const MARKER: &str = "[END_CONVERSATION]";

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
    outcomes: Mutex<Vec<ConversationOutcome>>,
}

#[async_trait]
impl EventSink for Recorder {
    async fn emit(&self, event: DomainEvent) -> Result<(), TwinlinkError> {
        self.events.lock().await.push(event.name().to_string());
        Ok(())
    }
}

#[async_trait]
impl OutcomeSink for Recorder {
    async fn conversation_concluded(
        &self,
        outcome: ConversationOutcome,
    ) -> Result<(), TwinlinkError> {
        self.outcomes.lock().await.push(outcome);
        Ok(())
    }
}

/// Replies "turn N" with a 0.8 estimate; appends the marker on turn
/// `conclude_at` and fails every call when `broken`.
struct Scripted {
    calls: AtomicUsize,
    conclude_at: Option<usize>,
    broken: bool,
}

impl Scripted {
    fn new(conclude_at: Option<usize>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            conclude_at,
            broken: false,
        }
    }

    fn broken() -> Self {
        Self {
            broken: true,
            ..Self::new(None)
        }
    }
}

#[async_trait]
impl PluginAdapter for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }
    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }
    fn adapter_type(&self) -> AdapterType {
        AdapterType::Generation
    }
    async fn health_check(&self) -> Result<HealthStatus, TwinlinkError> {
        Ok(HealthStatus::Healthy)
    }
    async fn shutdown(&self) -> Result<(), TwinlinkError> {
        Ok(())
    }
}

#[async_trait]
impl GenerationAdapter for Scripted {
    async fn generate_turn(&self, request: TurnRequest) -> Result<GeneratedTurn, TwinlinkError> {
        if self.broken {
            return Err(TwinlinkError::provider("generation service down"));
        }
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        assert_eq!(request.termination_marker, MARKER);
        let mut content = format!("turn {n}");
        if self.conclude_at == Some(n) {
            content.push(' ');
            content.push_str(MARKER);
        }
        Ok(GeneratedTurn {
            content,
            compatibility: Some(0.8),
        })
    }

    async fn explain_match(&self, _request: ReasonRequest) -> Result<String, TwinlinkError> {
        Err(TwinlinkError::Internal("not used".into()))
    }
}

struct Fixture {
    storage: Arc<dyn StorageAdapter>,
    queue: JobQueue,
    recorder: Arc<Recorder>,
    orchestrator: Arc<ConversationOrchestrator>,
}

async fn fixture(config: ConversationConfig, max_retries: u32) -> Fixture {
    let storage: Arc<dyn StorageAdapter> = memory_storage().await.unwrap();
    seed_users_with_agents(storage.as_ref(), &["u1", "u2", "u3"])
        .await
        .unwrap();
    let queue = JobQueue::new(storage.clone(), max_retries);
    let recorder = Arc::new(Recorder::default());
    let orchestrator = Arc::new(ConversationOrchestrator::new(
        storage.clone(),
        queue.clone(),
        recorder.clone(),
        recorder.clone(),
        config,
    ));
    Fixture {
        storage,
        queue,
        recorder,
        orchestrator,
    }
}

fn pool(f: &Fixture, generator: Arc<dyn GenerationAdapter>) -> WorkerPool {
    let mut pool = WorkerPool::new(f.queue.clone(), &SchedulerConfig::default());
    pool.register(Arc::new(TurnHandler::new(f.orchestrator.clone(), generator)));
    pool.register(Arc::new(StartConversationHandler::new(
        f.orchestrator.clone(),
        f.storage.clone(),
    )));
    pool.register(Arc::new(InactivitySweepHandler::new(f.orchestrator.clone())));
    pool
}

fn agent(id: &str) -> Party {
    Party::Agent(id.into())
}

fn user(id: &str) -> Party {
    Party::User(id.into())
}

#[tokio::test]
async fn start_rejects_mismatched_slots() {
    let f = fixture(ConversationConfig::default(), 3).await;
    let wrong_order = f
        .orchestrator
        .start(ConversationKind::UserToAgent, agent("agent-u1"), user("u2"))
        .await;
    assert!(matches!(wrong_order, Err(TwinlinkError::InvalidParticipants(_))));

    let same = f
        .orchestrator
        .start(ConversationKind::AgentToAgent, agent("agent-u1"), agent("agent-u1"))
        .await;
    assert!(matches!(same, Err(TwinlinkError::InvalidParticipants(_))));

    let missing = f
        .orchestrator
        .start(ConversationKind::AgentToAgent, agent("agent-u1"), agent("ghost"))
        .await;
    assert!(matches!(missing, Err(TwinlinkError::InvalidParticipants(_))));

    f.storage.set_user_active("u2", false).await.unwrap();
    let inactive = f
        .orchestrator
        .start(ConversationKind::UserToUser, user("u1"), user("u2"))
        .await;
    assert!(matches!(inactive, Err(TwinlinkError::InvalidParticipants(_))));
}

#[tokio::test]
async fn agent_conversation_runs_to_the_turn_limit() {
    let f = fixture(ConversationConfig::default(), 3).await;
    let conversation = f
        .orchestrator
        .start(ConversationKind::AgentToAgent, agent("agent-u1"), agent("agent-u2"))
        .await
        .unwrap();
    assert_eq!(conversation.max_turns, Some(10));

    let executed = pool(&f, Arc::new(Scripted::new(None))).drain().await.unwrap();
    assert_eq!(executed, 10);

    let ended = f.storage.get_conversation(&conversation.id).await.unwrap().unwrap();
    assert_eq!(ended.status, ConversationStatus::Ended);
    assert_eq!(ended.end_reason, Some(EndReason::MaxTurns));
    assert_eq!(ended.turn_count, 10);

    let messages = f.orchestrator.messages(&conversation.id, "u1", 0, 100).await.unwrap();
    let sequences: Vec<i64> = messages.iter().map(|m| m.sequence).collect();
    assert_eq!(sequences, (1..=10).collect::<Vec<_>>());
    assert_eq!(messages[0].sender, agent("agent-u1"));
    assert_eq!(messages[1].sender, agent("agent-u2"));
    assert_eq!(
        messages[0].metadata.as_ref().unwrap()[COMPATIBILITY_KEY].as_f64(),
        Some(0.8)
    );

    let outcomes = f.recorder.outcomes.lock().await.clone();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].end_reason, EndReason::MaxTurns);
    assert_eq!(outcomes[0].turns, 10);
    assert_eq!(outcomes[0].compatibility, Some(0.8));

    let late = f
        .orchestrator
        .append_turn(&conversation.id, NewMessage::text(agent("agent-u1"), "one more"))
        .await;
    assert!(matches!(late, Err(TwinlinkError::ConversationNotActive { .. })));

    let events = f.recorder.events.lock().await.clone();
    assert_eq!(events.iter().filter(|e| *e == "message_appended").count(), 10);
    assert_eq!(events.last().map(String::as_str), Some("conversation_ended"));

    let owner = f.storage.get_agent("agent-u1").await.unwrap().unwrap();
    assert_eq!(owner.total_conversations, 1);
}

#[tokio::test]
async fn termination_marker_concludes_and_is_stripped() {
    let f = fixture(ConversationConfig::default(), 3).await;
    let conversation = f
        .orchestrator
        .start(ConversationKind::AgentToAgent, agent("agent-u1"), agent("agent-u2"))
        .await
        .unwrap();

    pool(&f, Arc::new(Scripted::new(Some(3)))).drain().await.unwrap();

    let ended = f.storage.get_conversation(&conversation.id).await.unwrap().unwrap();
    assert_eq!(ended.end_reason, Some(EndReason::Concluded));
    assert_eq!(ended.turn_count, 3);

    let messages = f.orchestrator.messages(&conversation.id, "u2", 0, 100).await.unwrap();
    assert_eq!(messages[2].content, "turn 3");
}

#[tokio::test]
async fn user_message_schedules_the_agent_reply() {
    let f = fixture(ConversationConfig::default(), 3).await;
    let conversation = f
        .orchestrator
        .start(ConversationKind::UserToAgent, user("u1"), agent("agent-u2"))
        .await
        .unwrap();

    // The agent opens.
    let generator = Arc::new(Scripted::new(None));
    let workers = pool(&f, generator.clone());
    assert_eq!(workers.drain().await.unwrap(), 1);

    let turn = f
        .orchestrator
        .append_turn(&conversation.id, NewMessage::text(user("u1"), "hello there"))
        .await
        .unwrap();
    assert_eq!(turn.message.sequence, 2);
    assert_eq!(workers.drain().await.unwrap(), 1);

    let messages = f.orchestrator.messages(&conversation.id, "u1", 0, 100).await.unwrap();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[2].sender, agent("agent-u2"));
    assert_eq!(messages[2].content, "turn 2");
}

#[tokio::test]
async fn stale_turn_job_is_skipped() {
    let f = fixture(ConversationConfig::default(), 3).await;
    let conversation = f
        .orchestrator
        .start(ConversationKind::UserToAgent, user("u1"), agent("agent-u2"))
        .await
        .unwrap();
    f.orchestrator
        .append_turn(&conversation.id, NewMessage::text(user("u1"), "I go first"))
        .await
        .unwrap();

    let generator = Scripted::new(None);
    let skipped = f
        .orchestrator
        .agent_turn(&generator, &conversation.id, "agent-u2", 0)
        .await
        .unwrap();
    assert!(skipped.is_none());
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn user_conversations_are_unbounded_and_gap_free() {
    let f = fixture(ConversationConfig::default(), 3).await;
    let conversation = f
        .orchestrator
        .start(ConversationKind::UserToUser, user("u1"), user("u2"))
        .await
        .unwrap();
    assert_eq!(conversation.max_turns, None);

    let mut tasks = Vec::new();
    for i in 0..20 {
        let orchestrator = f.orchestrator.clone();
        let id = conversation.id.clone();
        let sender = if i % 2 == 0 { user("u1") } else { user("u2") };
        tasks.push(tokio::spawn(async move {
            orchestrator
                .append_turn(&id, NewMessage::text(sender, format!("message {i}")))
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let messages = f.orchestrator.messages(&conversation.id, "u1", 0, 100).await.unwrap();
    let sequences: Vec<i64> = messages.iter().map(|m| m.sequence).collect();
    assert_eq!(sequences, (1..=20).collect::<Vec<_>>());
    let current = f.storage.get_conversation(&conversation.id).await.unwrap().unwrap();
    assert_eq!(current.status, ConversationStatus::Active);
    assert_eq!(current.turn_count, 20);
    // No agent on either side, nothing to schedule.
    assert!(f.queue.list(None, Some(JobStatus::Pending), 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn inactivity_sweep_ends_idle_conversations() {
    let f = fixture(
        ConversationConfig {
            inactivity_timeout_secs: 0,
            ..ConversationConfig::default()
        },
        3,
    )
    .await;
    let conversation = f
        .orchestrator
        .start(ConversationKind::UserToUser, user("u1"), user("u2"))
        .await
        .unwrap();

    f.queue
        .enqueue(job_kinds::INACTIVITY_SWEEP, serde_json::json!({}), None)
        .await
        .unwrap();
    pool(&f, Arc::new(Scripted::new(None))).drain().await.unwrap();

    let ended = f.storage.get_conversation(&conversation.id).await.unwrap().unwrap();
    assert_eq!(ended.end_reason, Some(EndReason::InactivityTimeout));
    let outcomes = f.recorder.outcomes.lock().await.clone();
    assert_eq!(outcomes[0].compatibility, None);
}

#[tokio::test]
async fn close_archive_and_unarchive() {
    let f = fixture(ConversationConfig::default(), 3).await;
    let conversation = f
        .orchestrator
        .start(ConversationKind::UserToUser, user("u1"), user("u2"))
        .await
        .unwrap();

    let outsider = f.orchestrator.close(&conversation.id, "u3").await;
    assert!(matches!(outsider, Err(TwinlinkError::NotFound { .. })));

    let early = f.orchestrator.archive(&conversation.id, "u1").await;
    assert!(matches!(early, Err(TwinlinkError::InvalidTransition { .. })));

    let closed = f.orchestrator.close(&conversation.id, "u2").await.unwrap();
    assert_eq!(closed.end_reason, Some(EndReason::Closed));
    let again = f.orchestrator.close(&conversation.id, "u2").await;
    assert!(matches!(again, Err(TwinlinkError::ConversationNotActive { .. })));

    let archived = f.orchestrator.archive(&conversation.id, "u1").await.unwrap();
    assert_eq!(archived.status, ConversationStatus::Archived);
    let restored = f.orchestrator.unarchive(&conversation.id, "u1").await.unwrap();
    assert_eq!(restored.status, ConversationStatus::Ended);
}

#[tokio::test]
async fn agent_owners_can_read_their_agents_conversations() {
    let f = fixture(ConversationConfig::default(), 3).await;
    let conversation = f
        .orchestrator
        .start(ConversationKind::AgentToAgent, agent("agent-u1"), agent("agent-u2"))
        .await
        .unwrap();

    assert!(f.orchestrator.get(&conversation.id, "u1").await.is_ok());
    assert!(f.orchestrator.get(&conversation.id, "u2").await.is_ok());
    assert!(matches!(
        f.orchestrator.get(&conversation.id, "u3").await,
        Err(TwinlinkError::NotFound { .. })
    ));
}

#[tokio::test]
async fn exhausted_turn_fails_the_conversation() {
    let f = fixture(ConversationConfig::default(), 0).await;
    let conversation = f
        .orchestrator
        .start(ConversationKind::AgentToAgent, agent("agent-u1"), agent("agent-u2"))
        .await
        .unwrap();

    pool(&f, Arc::new(Scripted::broken())).drain().await.unwrap();

    let failed = f.storage.get_conversation(&conversation.id).await.unwrap().unwrap();
    assert_eq!(failed.status, ConversationStatus::Ended);
    assert_eq!(failed.end_reason, Some(EndReason::Failed));
    assert!(failed.failure_reason.unwrap().contains("generation service down"));
    let outcomes = f.recorder.outcomes.lock().await.clone();
    assert_eq!(outcomes[0].end_reason, EndReason::Failed);
}

#[tokio::test]
async fn start_as_requires_the_caller_in_slot_a() {
    let f = fixture(ConversationConfig::default(), 3).await;
    let foreign = f
        .orchestrator
        .start_as("u3", ConversationKind::AgentToAgent, agent("agent-u1"), agent("agent-u2"))
        .await;
    assert!(matches!(foreign, Err(TwinlinkError::InvalidParticipants(_))));

    let own = f
        .orchestrator
        .start_as("u1", ConversationKind::UserToAgent, user("u1"), agent("agent-u2"))
        .await
        .unwrap();
    assert_eq!(own.party_a, user("u1"));
}

fn pending_match(id: &str) -> Match {
    Match {
        id: id.into(),
        user1_id: "u1".into(),
        user2_id: "u2".into(),
        agent1_id: "agent-u1".into(),
        agent2_id: "agent-u2".into(),
        score: 0.9,
        reason: None,
        status: MatchStatus::Pending,
        user1_response: None,
        user2_response: None,
        conversation_id: None,
        expires_at: "2999-01-01T00:00:00.000Z".into(),
        responded_at: None,
        created_at: "2026-01-01T00:00:00.000Z".into(),
        updated_at: "2026-01-01T00:00:00.000Z".into(),
    }
}

#[tokio::test]
async fn repeated_start_jobs_open_one_match_conversation() {
    let f = fixture(ConversationConfig::default(), 3).await;
    f.storage.create_match_if_absent(&pending_match("m1")).await.unwrap();
    for _ in 0..2 {
        f.queue
            .enqueue(job_kinds::START_CONVERSATION, json!({ "match_id": "m1" }), None)
            .await
            .unwrap();
    }

    pool(&f, Arc::new(Scripted::new(Some(2)))).drain().await.unwrap();

    let conversations = f
        .storage
        .list_conversations_for_user("u1", Page::default())
        .await
        .unwrap();
    assert_eq!(conversations.len(), 1);
    let linked = f.storage.get_match("m1").await.unwrap().unwrap();
    assert_eq!(linked.conversation_id.as_deref(), Some(conversations[0].id.as_str()));
    for agent_id in ["agent-u1", "agent-u2"] {
        let agent = f.storage.get_agent(agent_id).await.unwrap().unwrap();
        assert_eq!(agent.total_conversations, 1);
    }
}

#[tokio::test]
async fn linked_match_start_writes_nothing() {
    let f = fixture(ConversationConfig::default(), 3).await;
    let proposal = pending_match("m1");
    f.storage.create_match_if_absent(&proposal).await.unwrap();

    let first = f.orchestrator.start_for_match(&proposal).await.unwrap();
    assert!(first.is_some());
    assert!(f.orchestrator.start_for_match(&proposal).await.unwrap().is_none());

    let turns = f
        .queue
        .list(None, Some(JobStatus::Pending), 10)
        .await
        .unwrap()
        .into_iter()
        .filter(|j| j.kind == job_kinds::CONVERSATION_TURN)
        .count();
    assert_eq!(turns, 1);
    let agent = f.storage.get_agent("agent-u1").await.unwrap().unwrap();
    assert_eq!(agent.total_conversations, 1);
}
