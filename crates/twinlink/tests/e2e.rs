// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end scenarios across matching, conversations and notifications.
//!
//! Each test creates an isolated TestHarness with a temp SQLite database
//! and mock adapters. Background work runs only when a test drains the
//! queue, so scenarios are deterministic and order-insensitive.

use twinlink_config::TwinlinkConfig;
use twinlink_config::model::MatchingConfig;
use twinlink_core::TwinlinkError;
use twinlink_core::types::{
    ConversationKind, ConversationStatus, Decision, EndReason, JobStatus, MatchStatus, NewMessage,
    Page, Party, job_kinds, notification_types,
};
use twinlink_test_utils::TestHarness;

async fn harness_with(matching: MatchingConfig) -> TestHarness {
    let config = TwinlinkConfig {
        matching,
        ..TwinlinkConfig::default()
    };
    let harness = TestHarness::builder().with_config(config).build().await.unwrap();
    harness
        .seed(&[
            ("u1", vec![1.0, 0.0]),
            ("u2", vec![0.96, 0.28]),
            ("u3", vec![0.0, 1.0]),
        ])
        .await
        .unwrap();
    harness.embed_all().await.unwrap();
    harness
}

// ---- Scenario 1: discover, accept on both sides, notify ----

#[tokio::test]
async fn discovery_and_mutual_accept_notify_both_users() {
    let h = harness_with(MatchingConfig {
        auto_converse: false,
        ..MatchingConfig::default()
    })
    .await;

    let found = h.matches.discover("u1").await.unwrap();
    assert_eq!(found.len(), 1, "only u2 clears the score threshold");
    let m = &found[0];
    assert_eq!(
        (m.user1_id.as_str(), m.user2_id.as_str()),
        ("u1", "u2"),
        "pair is stored in canonical order"
    );
    assert!(m.score >= 0.7);

    // The explanation job fills in the reason.
    h.drain_jobs().await.unwrap();
    let m = h.matches.get(&m.id, "u2").await.unwrap();
    assert!(m.reason.as_deref().is_some_and(|r| !r.is_empty()));

    let half = h.matches.respond(&m.id, "u1", Decision::Accept).await.unwrap();
    assert_eq!(half.status, MatchStatus::Pending);
    let err = h.matches.respond(&m.id, "u1", Decision::Accept).await.unwrap_err();
    assert!(matches!(err, TwinlinkError::AlreadyResponded { .. }));

    let accepted = h.matches.respond(&m.id, "u2", Decision::Accept).await.unwrap();
    assert_eq!(accepted.status, MatchStatus::Accepted);

    for user in ["u1", "u2"] {
        let kinds: Vec<String> = h
            .notifications
            .list(user, false, Page::default())
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                notification_types::MATCH_ACCEPTED.to_string(),
                notification_types::MATCH_FOUND.to_string()
            ],
            "{user} sees newest first"
        );
        assert_eq!(h.notifications.unread_count(user).await.unwrap(), 2);
    }
    assert_eq!(h.notifications.unread_count("u3").await.unwrap(), 0);

    // A second discovery does not propose the accepted pair again.
    assert!(h.matches.discover("u2").await.unwrap().is_empty());
}

// ---- Scenario 2: expiry, then a late response ----

#[tokio::test]
async fn expired_match_refuses_late_responses() {
    let h = harness_with(MatchingConfig {
        expiry_days: 0,
        auto_converse: false,
        generate_reasons: false,
        ..MatchingConfig::default()
    })
    .await;

    let m = h.matches.discover("u2").await.unwrap().remove(0);

    h.queue
        .enqueue(job_kinds::EXPIRE_MATCHES, serde_json::json!({}), None)
        .await
        .unwrap();
    h.drain_jobs().await.unwrap();

    let expired = h.matches.get(&m.id, "u1").await.unwrap();
    assert_eq!(expired.status, MatchStatus::Expired);

    let err = h.matches.respond(&m.id, "u1", Decision::Accept).await.unwrap_err();
    assert!(matches!(
        err,
        TwinlinkError::MatchNotPending {
            status: MatchStatus::Expired,
            ..
        }
    ));

    let listed = h
        .matches
        .list("u2", Some(MatchStatus::Expired), Page::default())
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
}

// ---- Scenario 3: an agent conversation runs to its turn limit ----

#[tokio::test]
async fn agent_conversation_ends_after_ten_turns() {
    let h = harness_with(MatchingConfig::default()).await;
    assert_eq!(h.conversations.config().max_turns, 10);

    let m = h.matches.discover("u1").await.unwrap().remove(0);
    assert!(m.score >= h.config.matching.converse_min_score);

    // Start job, ten turn jobs and the reason job.
    h.drain_jobs().await.unwrap();

    let m = h.matches.get(&m.id, "u1").await.unwrap();
    let conversation_id = m.conversation_id.clone().expect("conversation linked to match");
    let conversation = h.conversations.get(&conversation_id, "u2").await.unwrap();
    assert_eq!(conversation.kind, ConversationKind::AgentToAgent);
    assert_eq!(conversation.status, ConversationStatus::Ended);
    assert_eq!(conversation.end_reason, Some(EndReason::MaxTurns));
    assert_eq!(conversation.turn_count, 10);

    let messages = h
        .conversations
        .messages(&conversation_id, "u1", 0, 100)
        .await
        .unwrap();
    let sequences: Vec<i64> = messages.iter().map(|m| m.sequence).collect();
    assert_eq!(sequences, (1..=10).collect::<Vec<_>>());
    assert_eq!(h.generator.turns(), 10);

    let err = h
        .conversations
        .append_turn(
            &conversation_id,
            NewMessage::text(Party::Agent("agent-u1".into()), "one more thing"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, TwinlinkError::ConversationNotActive { .. }));

    // No turn job is left behind.
    let pending = h.queue.list(None, Some(JobStatus::Pending), 100).await.unwrap();
    assert!(pending.is_empty());
}
