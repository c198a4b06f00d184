// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Match engine behaviour against in-memory storage.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Mutex;
use twinlink_config::model::{MatchingConfig, SchedulerConfig};
use twinlink_core::traits::{GeneratedTurn, ReasonRequest, TurnRequest};
use twinlink_core::types::{
    Decision, EndReason, JobStatus, Match, MatchStatus, Page, PrivacySettings, job_kinds,
};
use twinlink_core::{
    AdapterType, ConversationOutcome, DomainEvent, EventSink, GenerationAdapter, HealthStatus,
    PluginAdapter, SimilarityIndex, StorageAdapter, TwinlinkError,
};
use twinlink_match::{MatchEngine, ReasonHandler};
use twinlink_scheduler::{JobQueue, WorkerPool};
use twinlink_similarity::SqliteSimilarityIndex;
use twinlink_storage::testing::{memory_storage, seed_users_with_agents};

#[derive(Default)]
struct Recorder(Mutex<Vec<String>>);

#[async_trait]
impl EventSink for Recorder {
    async fn emit(&self, event: DomainEvent) -> Result<(), TwinlinkError> {
        self.0.lock().await.push(event.name().to_string());
        Ok(())
    }
}

struct Fixture {
    storage: Arc<dyn StorageAdapter>,
    queue: JobQueue,
    events: Arc<Recorder>,
    engine: Arc<MatchEngine>,
}

/// u1 and u2 are close, u3 is far, u4 is a perfect fit but deactivated.
async fn fixture(config: MatchingConfig) -> Fixture {
    let storage: Arc<dyn StorageAdapter> = memory_storage().await.unwrap();
    seed_users_with_agents(storage.as_ref(), &["u1", "u2", "u3", "u4"])
        .await
        .unwrap();
    storage.set_user_active("u4", false).await.unwrap();

    let index = Arc::new(SqliteSimilarityIndex::new(storage.clone()));
    index.upsert("agent-u1", vec![1.0, 0.0], "test").await.unwrap();
    index.upsert("agent-u2", vec![0.96, 0.28], "test").await.unwrap();
    index.upsert("agent-u3", vec![0.0, 1.0], "test").await.unwrap();
    index.upsert("agent-u4", vec![1.0, 0.0], "test").await.unwrap();

    let queue = JobQueue::new(storage.clone(), 3);
    let events = Arc::new(Recorder::default());
    let engine = Arc::new(MatchEngine::new(
        storage.clone(),
        index,
        queue.clone(),
        events.clone(),
        config,
    ));
    Fixture {
        storage,
        queue,
        events,
        engine,
    }
}

async fn pending_kinds(queue: &JobQueue) -> Vec<String> {
    let mut kinds: Vec<String> = queue
        .list(None, Some(JobStatus::Pending), 100)
        .await
        .unwrap()
        .into_iter()
        .map(|j| j.kind)
        .collect();
    kinds.sort();
    kinds
}

#[tokio::test]
async fn discover_proposes_close_active_candidates() {
    let f = fixture(MatchingConfig::default()).await;
    let pending = f.engine.discover("u1").await.unwrap();

    assert_eq!(pending.len(), 1);
    let m = &pending[0];
    assert_eq!((m.user1_id.as_str(), m.user2_id.as_str()), ("u1", "u2"));
    assert_eq!((m.agent1_id.as_str(), m.agent2_id.as_str()), ("agent-u1", "agent-u2"));
    assert_eq!(m.score, 0.98);
    assert_eq!(m.status, MatchStatus::Pending);
    assert!(m.expires_at > m.created_at);

    assert_eq!(
        pending_kinds(&f.queue).await,
        vec![job_kinds::START_CONVERSATION.to_string(), job_kinds::MATCH_REASON.to_string()]
    );
    assert_eq!(*f.events.0.lock().await, vec!["match_proposed".to_string()]);
}

#[tokio::test]
async fn rediscovery_reuses_the_open_match() {
    let f = fixture(MatchingConfig::default()).await;
    let first = f.engine.discover("u1").await.unwrap();
    let again = f.engine.discover("u1").await.unwrap();
    let other_side = f.engine.discover("u2").await.unwrap();

    assert_eq!(again.len(), 1);
    assert_eq!(again[0].id, first[0].id);
    assert_eq!(other_side.len(), 1);
    assert_eq!(other_side[0].id, first[0].id);
    assert_eq!(f.events.0.lock().await.len(), 1);
}

#[tokio::test]
async fn concurrent_discovery_creates_one_match_per_pair() {
    let f = fixture(MatchingConfig::default()).await;
    let (a, b) = tokio::join!(f.engine.discover("u1"), f.engine.discover("u2"));
    a.unwrap();
    b.unwrap();

    let all = f
        .engine
        .list("u1", None, Page::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn hidden_and_inactive_owners_are_skipped() {
    let f = fixture(MatchingConfig::default()).await;
    f.storage
        .set_user_privacy(
            "u2",
            PrivacySettings {
                profile_visible: true,
                discoverable: false,
            },
        )
        .await
        .unwrap();

    assert!(f.engine.discover("u1").await.unwrap().is_empty());
    assert!(f.events.0.lock().await.is_empty());
}

#[tokio::test]
async fn top_k_counts_only_eligible_candidates() {
    let f = fixture(MatchingConfig {
        top_k: 1,
        ..MatchingConfig::default()
    })
    .await;
    // An older agent of the caller with an identical vector.
    let mut old = twinlink_storage::testing::agent("agent-u1-old", "u1");
    old.is_active = false;
    f.storage.create_agent(&old).await.unwrap();
    let index = SqliteSimilarityIndex::new(f.storage.clone());
    index.upsert("agent-u1-old", vec![1.0, 0.0], "test").await.unwrap();
    assert!(
        f.storage
            .get_agent("agent-u1")
            .await
            .unwrap()
            .unwrap()
            .is_active
    );

    let pending = f.engine.discover("u1").await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].user2_id, "u2");
}

#[tokio::test]
async fn inactive_user_gets_no_matches() {
    let f = fixture(MatchingConfig::default()).await;
    assert!(f.engine.discover("u4").await.unwrap().is_empty());
}

#[tokio::test]
async fn missing_embedding_enqueues_embedding_job() {
    let f = fixture(MatchingConfig::default()).await;
    seed_users_with_agents(f.storage.as_ref(), &["u5"]).await.unwrap();

    assert!(f.engine.discover("u5").await.unwrap().is_empty());
    let jobs = f.queue.list(Some("u5"), None, 10).await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].kind, job_kinds::EMBED_AGENT);
    assert_eq!(jobs[0].payload, json!({"agent_id": "agent-u5"}));
}

#[tokio::test]
async fn unknown_user_is_not_found() {
    let f = fixture(MatchingConfig::default()).await;
    let err = f.engine.discover("nobody").await.unwrap_err();
    assert!(matches!(err, TwinlinkError::NotFound { entity: "user", .. }));
}

#[tokio::test]
async fn both_sides_must_accept() {
    let f = fixture(MatchingConfig::default()).await;
    let m = f.engine.discover("u1").await.unwrap().remove(0);

    let after_first = f.engine.respond(&m.id, "u1", Decision::Accept).await.unwrap();
    assert_eq!(after_first.status, MatchStatus::Pending);
    assert_eq!(after_first.user1_response, Some(Decision::Accept));

    let replay = f.engine.respond(&m.id, "u1", Decision::Accept).await.unwrap_err();
    assert!(matches!(replay, TwinlinkError::AlreadyResponded { .. }));

    let outsider = f.engine.respond(&m.id, "u3", Decision::Accept).await.unwrap_err();
    assert!(matches!(outsider, TwinlinkError::NotParticipant { .. }));

    let done = f.engine.respond(&m.id, "u2", Decision::Accept).await.unwrap();
    assert_eq!(done.status, MatchStatus::Accepted);
    assert!(done.responded_at.is_some());
    assert!(f.events.0.lock().await.contains(&"match_accepted".to_string()));
}

async fn respond_concurrently(
    f: &Fixture,
    match_id: &str,
    first: Decision,
    second: Decision,
) -> (Result<Match, TwinlinkError>, Result<Match, TwinlinkError>) {
    let (engine1, id1) = (f.engine.clone(), match_id.to_string());
    let (engine2, id2) = (f.engine.clone(), match_id.to_string());
    let a = tokio::spawn(async move { engine1.respond(&id1, "u1", first).await });
    let b = tokio::spawn(async move { engine2.respond(&id2, "u2", second).await });
    (a.await.unwrap(), b.await.unwrap())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_acceptances_both_land() {
    let f = fixture(MatchingConfig::default()).await;
    let m = f.engine.discover("u1").await.unwrap().remove(0);

    let (a, b) = respond_concurrently(&f, &m.id, Decision::Accept, Decision::Accept).await;
    a.unwrap();
    b.unwrap();

    let stored = f.engine.get(&m.id, "u1").await.unwrap();
    assert_eq!(stored.user1_response, Some(Decision::Accept));
    assert_eq!(stored.user2_response, Some(Decision::Accept));
    assert_eq!(stored.status, MatchStatus::Accepted);
    assert!(stored.responded_at.is_some());
    let events = f.events.0.lock().await;
    assert_eq!(events.iter().filter(|e| *e == "match_accepted").count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_accept_and_reject_end_rejected() {
    let f = fixture(MatchingConfig::default()).await;
    let m = f.engine.discover("u1").await.unwrap().remove(0);

    let (accept, reject) =
        respond_concurrently(&f, &m.id, Decision::Accept, Decision::Reject).await;
    reject.unwrap();

    let stored = f.engine.get(&m.id, "u1").await.unwrap();
    assert_eq!(stored.status, MatchStatus::Rejected);
    assert_eq!(stored.user2_response, Some(Decision::Reject));
    match accept {
        // The acceptance landed first and was kept.
        Ok(_) => assert_eq!(stored.user1_response, Some(Decision::Accept)),
        // The rejection landed first and closed the match.
        Err(err) => {
            assert!(matches!(
                err,
                TwinlinkError::MatchNotPending {
                    status: MatchStatus::Rejected,
                    ..
                }
            ));
            assert_eq!(stored.user1_response, None);
        }
    }
}

#[tokio::test]
async fn one_rejection_closes_the_match() {
    let f = fixture(MatchingConfig::default()).await;
    let m = f.engine.discover("u1").await.unwrap().remove(0);

    let rejected = f.engine.respond(&m.id, "u2", Decision::Reject).await.unwrap();
    assert_eq!(rejected.status, MatchStatus::Rejected);

    let late = f.engine.respond(&m.id, "u1", Decision::Accept).await.unwrap_err();
    assert!(matches!(
        late,
        TwinlinkError::MatchNotPending {
            status: MatchStatus::Rejected,
            ..
        }
    ));
    // A rejected pair is not proposed again.
    assert!(f.engine.discover("u1").await.unwrap().is_empty());
}

#[tokio::test]
async fn expired_matches_refuse_responses_and_allow_rediscovery() {
    let f = fixture(MatchingConfig {
        expiry_days: 0,
        ..MatchingConfig::default()
    })
    .await;
    let m = f.engine.discover("u1").await.unwrap().remove(0);

    let err = f.engine.respond(&m.id, "u2", Decision::Accept).await.unwrap_err();
    assert!(matches!(
        err,
        TwinlinkError::MatchNotPending {
            status: MatchStatus::Expired,
            ..
        }
    ));

    let expired = f.engine.expire_due().await.unwrap();
    assert_eq!(expired.len(), 1);
    assert!(f.engine.expire_due().await.unwrap().is_empty());
    assert_eq!(
        f.engine.get(&m.id, "u1").await.unwrap().status,
        MatchStatus::Expired
    );

    let fresh = f.engine.discover("u1").await.unwrap();
    assert_eq!(fresh.len(), 1);
    assert_ne!(fresh[0].id, m.id);
}

#[tokio::test]
async fn get_is_limited_to_participants() {
    let f = fixture(MatchingConfig::default()).await;
    let m = f.engine.discover("u1").await.unwrap().remove(0);
    assert_eq!(f.engine.get(&m.id, "u2").await.unwrap().id, m.id);
    assert!(matches!(
        f.engine.get(&m.id, "u3").await.unwrap_err(),
        TwinlinkError::NotParticipant { .. }
    ));
    assert!(matches!(
        f.engine.get("missing", "u1").await.unwrap_err(),
        TwinlinkError::NotFound { .. }
    ));
}

#[tokio::test]
async fn outcomes_blend_pending_scores() {
    let f = fixture(MatchingConfig::default()).await;
    let m = f.engine.discover("u1").await.unwrap().remove(0);

    let outcome = |end_reason, compatibility| ConversationOutcome {
        conversation_id: "c1".into(),
        match_id: Some(m.id.clone()),
        end_reason,
        turns: 6,
        compatibility,
    };

    assert_eq!(f.engine.apply_outcome(&outcome(EndReason::Failed, Some(0.2))).await.unwrap(), None);
    assert_eq!(f.engine.apply_outcome(&outcome(EndReason::Concluded, None)).await.unwrap(), None);
    assert_eq!(
        f.engine.apply_outcome(&outcome(EndReason::Concluded, Some(0.5))).await.unwrap(),
        Some(0.74)
    );
    assert_eq!(f.engine.get(&m.id, "u1").await.unwrap().score, 0.74);
}

struct FixedReason;

#[async_trait]
impl PluginAdapter for FixedReason {
    fn name(&self) -> &str {
        "fixed"
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
impl GenerationAdapter for FixedReason {
    async fn generate_turn(&self, _request: TurnRequest) -> Result<GeneratedTurn, TwinlinkError> {
        Err(TwinlinkError::Internal("not used".into()))
    }
    async fn explain_match(&self, request: ReasonRequest) -> Result<String, TwinlinkError> {
        Ok(format!("{} meets {}", request.first.name, request.second.name))
    }
}

#[tokio::test]
async fn reason_job_stores_explanation_without_changing_status() {
    let f = fixture(MatchingConfig {
        auto_converse: false,
        ..MatchingConfig::default()
    })
    .await;
    let m = f.engine.discover("u1").await.unwrap().remove(0);

    let mut pool = WorkerPool::new(f.queue.clone(), &SchedulerConfig::default());
    pool.register(Arc::new(ReasonHandler::new(f.storage.clone(), Arc::new(FixedReason))));
    assert_eq!(pool.drain().await.unwrap(), 1);

    let stored = f.engine.get(&m.id, "u1").await.unwrap();
    assert_eq!(stored.reason.as_deref(), Some("u1's twin meets u2's twin"));
    assert_eq!(stored.status, MatchStatus::Pending);
}
