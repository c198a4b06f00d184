// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Match persistence and the response state machine.

use rusqlite::{Connection, OptionalExtension, Row, params};
use twinlink_core::TwinlinkError;
use twinlink_core::types::{Decision, Match, MatchInsert, MatchStatus, Page};

use crate::database::{Database, map_tr_err};
use crate::rows::{not_found, parse_col, parse_opt_col};

const MATCH_COLUMNS: &str = "id, user1_id, user2_id, agent1_id, agent2_id, score, reason, status, \
                             user1_response, user2_response, conversation_id, expires_at, \
                             responded_at, created_at, updated_at";

fn match_from_row(row: &Row<'_>) -> rusqlite::Result<Match> {
    Ok(Match {
        id: row.get(0)?,
        user1_id: row.get(1)?,
        user2_id: row.get(2)?,
        agent1_id: row.get(3)?,
        agent2_id: row.get(4)?,
        score: row.get(5)?,
        reason: row.get(6)?,
        status: parse_col(row, 7)?,
        user1_response: parse_opt_col(row, 8)?,
        user2_response: parse_opt_col(row, 9)?,
        conversation_id: row.get(10)?,
        expires_at: row.get(11)?,
        responded_at: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

fn select_match(conn: &Connection, id: &str) -> rusqlite::Result<Option<Match>> {
    conn.query_row(
        &format!("SELECT {MATCH_COLUMNS} FROM matches WHERE id = ?1"),
        params![id],
        match_from_row,
    )
    .optional()
}

/// Status after `user_id` answers `decision`, given the other side's answer.
fn resolve_status(decision: Decision, other: Option<Decision>) -> MatchStatus {
    match (decision, other) {
        (Decision::Reject, _) | (_, Some(Decision::Reject)) => MatchStatus::Rejected,
        (Decision::Accept, Some(Decision::Accept)) => MatchStatus::Accepted,
        (Decision::Accept, None) => MatchStatus::Pending,
    }
}

/// Insert unless the unordered pair already has a non-expired match.
pub async fn create_match_if_absent(
    db: &Database,
    proposal: &Match,
) -> Result<MatchInsert, TwinlinkError> {
    if proposal.user1_id >= proposal.user2_id {
        return Err(TwinlinkError::Internal(format!(
            "match pair must be ordered, got ({}, {})",
            proposal.user1_id, proposal.user2_id
        )));
    }
    let proposal = proposal.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let existing = tx
                .query_row(
                    &format!(
                        "SELECT {MATCH_COLUMNS} FROM matches
                         WHERE user1_id = ?1 AND user2_id = ?2 AND status != 'expired'"
                    ),
                    params![proposal.user1_id, proposal.user2_id],
                    match_from_row,
                )
                .optional()?;
            if let Some(existing) = existing {
                tx.commit()?;
                return Ok(MatchInsert::Existing(existing));
            }
            tx.execute(
                "INSERT INTO matches (id, user1_id, user2_id, agent1_id, agent2_id, score, reason,
                                      status, expires_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8, ?9, ?9)",
                params![
                    proposal.id,
                    proposal.user1_id,
                    proposal.user2_id,
                    proposal.agent1_id,
                    proposal.agent2_id,
                    proposal.score,
                    proposal.reason,
                    proposal.expires_at,
                    proposal.created_at,
                ],
            )?;
            let created = select_match(&tx, &proposal.id)?;
            tx.commit()?;
            created
                .map(MatchInsert::Created)
                .ok_or(rusqlite::Error::QueryReturnedNoRows)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_match(db: &Database, id: &str) -> Result<Option<Match>, TwinlinkError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| select_match(conn, &id))
        .await
        .map_err(map_tr_err)
}

/// Matches involving `user_id`, newest first.
pub async fn list_matches_for_user(
    db: &Database,
    user_id: &str,
    status: Option<MatchStatus>,
    page: Page,
) -> Result<Vec<Match>, TwinlinkError> {
    let user_id = user_id.to_string();
    let status = status.map(|s| s.to_string());
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MATCH_COLUMNS} FROM matches
                 WHERE (user1_id = ?1 OR user2_id = ?1) AND (?2 IS NULL OR status = ?2)
                 ORDER BY created_at DESC, id
                 LIMIT ?3 OFFSET ?4"
            ))?;
            let rows = stmt.query_map(
                params![user_id, status, page.limit, page.offset],
                match_from_row,
            )?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Users sharing a pending, accepted, or rejected match with `user_id`.
pub async fn open_match_counterparts(
    db: &Database,
    user_id: &str,
) -> Result<Vec<String>, TwinlinkError> {
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT CASE WHEN user1_id = ?1 THEN user2_id ELSE user1_id END
                 FROM matches
                 WHERE (user1_id = ?1 OR user2_id = ?1) AND status != 'expired'",
            )?;
            let rows = stmt.query_map(params![user_id], |row| row.get(0))?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Record one side's decision.
///
/// A pending match past its `expires_at` is treated as expired even if the
/// expiry sweep has not reached it yet; nothing is written in that case.
pub async fn record_match_response(
    db: &Database,
    match_id: &str,
    user_id: &str,
    decision: Decision,
    at: &str,
) -> Result<Match, TwinlinkError> {
    let match_id = match_id.to_string();
    let user_id = user_id.to_string();
    let at = at.to_string();
    db.connection()
        .call(move |conn| -> Result<Result<Match, TwinlinkError>, rusqlite::Error> {
            let tx = conn.transaction()?;
            let Some(current) = select_match(&tx, &match_id)? else {
                return Ok(Err(not_found("match", &match_id)));
            };
            if !current.involves(&user_id) {
                return Ok(Err(TwinlinkError::NotParticipant { match_id, user_id }));
            }
            if current.status != MatchStatus::Pending {
                return Ok(Err(TwinlinkError::MatchNotPending {
                    match_id,
                    status: current.status,
                }));
            }
            if current.expires_at <= at {
                return Ok(Err(TwinlinkError::MatchNotPending {
                    match_id,
                    status: MatchStatus::Expired,
                }));
            }
            if current.response_of(&user_id).is_some() {
                return Ok(Err(TwinlinkError::AlreadyResponded { match_id, user_id }));
            }

            let first_side = current.user1_id == user_id;
            let other = if first_side {
                current.user2_response
            } else {
                current.user1_response
            };
            let status = resolve_status(decision, other);
            let responded_at = status.is_terminal().then_some(at.as_str());
            let column = if first_side {
                "user1_response"
            } else {
                "user2_response"
            };
            tx.execute(
                &format!(
                    "UPDATE matches SET {column} = ?2, status = ?3,
                     responded_at = COALESCE(?4, responded_at), updated_at = ?5
                     WHERE id = ?1 AND status = 'pending'"
                ),
                params![
                    match_id,
                    decision.to_string(),
                    status.to_string(),
                    responded_at,
                    at
                ],
            )?;
            let updated = select_match(&tx, &match_id)?;
            tx.commit()?;
            Ok(updated.ok_or_else(|| not_found("match", &match_id)))
        })
        .await
        .map_err(map_tr_err)?
}

/// Expire every pending match due at `now`, returning the expired rows.
pub async fn expire_matches(db: &Database, now: &str) -> Result<Vec<Match>, TwinlinkError> {
    let now = now.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let due: Vec<Match> = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {MATCH_COLUMNS} FROM matches
                     WHERE status = 'pending' AND expires_at <= ?1
                     ORDER BY expires_at"
                ))?;
                let rows = stmt.query_map(params![now], match_from_row)?;
                rows.collect::<rusqlite::Result<_>>()?
            };
            tx.execute(
                "UPDATE matches SET status = 'expired', updated_at = ?1
                 WHERE status = 'pending' AND expires_at <= ?1",
                params![now],
            )?;
            tx.commit()?;
            Ok(due
                .into_iter()
                .map(|m| Match {
                    status: MatchStatus::Expired,
                    updated_at: now.clone(),
                    ..m
                })
                .collect())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn set_match_reason(
    db: &Database,
    match_id: &str,
    reason: &str,
) -> Result<(), TwinlinkError> {
    let match_id = match_id.to_string();
    let reason = reason.to_string();
    db.connection()
        .call(move |conn| -> Result<Result<(), TwinlinkError>, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE matches SET reason = ?2,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![match_id, reason],
            )?;
            if changed == 0 {
                return Ok(Err(not_found("match", &match_id)));
            }
            Ok(Ok(()))
        })
        .await
        .map_err(map_tr_err)?
}

/// Link a conversation once. Returns false if one is already linked.
/// Point an open match at its conversation. False if the match is closed,
/// missing, or already linked.
pub(crate) fn link_conversation(
    conn: &Connection,
    match_id: &str,
    conversation_id: &str,
    at: &str,
) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "UPDATE matches SET conversation_id = ?2, updated_at = ?3
         WHERE id = ?1 AND conversation_id IS NULL AND status IN ('pending', 'accepted')",
        params![match_id, conversation_id, at],
    )?;
    Ok(changed == 1)
}

pub async fn update_pending_match_score(
    db: &Database,
    match_id: &str,
    score: f64,
) -> Result<bool, TwinlinkError> {
    let match_id = match_id.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE matches SET score = ?2,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1 AND status = 'pending'",
                params![match_id, score],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::profiles::create_agent;
    use crate::queries::test_support::{agent, seeded_db};

    const NOW: &str = "2026-03-01T12:00:00.000Z";

    fn proposal(id: &str, user1: &str, user2: &str) -> Match {
        Match {
            id: id.into(),
            user1_id: user1.into(),
            user2_id: user2.into(),
            agent1_id: format!("{user1}-agent"),
            agent2_id: format!("{user2}-agent"),
            score: 0.82,
            reason: None,
            status: MatchStatus::Pending,
            user1_response: None,
            user2_response: None,
            conversation_id: None,
            expires_at: "2026-03-08T12:00:00.000Z".into(),
            responded_at: None,
            created_at: NOW.into(),
            updated_at: NOW.into(),
        }
    }

    async fn db_with_pair() -> Database {
        let db = seeded_db(&["alice", "bob", "carol"]).await;
        for user in ["alice", "bob", "carol"] {
            create_agent(&db, &agent(&format!("{user}-agent"), user))
                .await
                .unwrap();
        }
        db
    }

    async fn created(db: &Database, m: &Match) -> Match {
        match create_match_if_absent(db, m).await.unwrap() {
            MatchInsert::Created(m) => m,
            MatchInsert::Existing(m) => panic!("unexpected existing match {}", m.id),
        }
    }

    #[tokio::test]
    async fn duplicate_pair_returns_existing() {
        let db = db_with_pair().await;
        created(&db, &proposal("m1", "alice", "bob")).await;

        match create_match_if_absent(&db, &proposal("m2", "alice", "bob"))
            .await
            .unwrap()
        {
            MatchInsert::Existing(existing) => assert_eq!(existing.id, "m1"),
            MatchInsert::Created(_) => panic!("pair must stay unique"),
        }
    }

    #[tokio::test]
    async fn unordered_pair_is_rejected() {
        let db = db_with_pair().await;
        let err = create_match_if_absent(&db, &proposal("m1", "bob", "alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, TwinlinkError::Internal(_)));
    }

    #[tokio::test]
    async fn both_accept_resolves_to_accepted() {
        let db = db_with_pair().await;
        created(&db, &proposal("m1", "alice", "bob")).await;

        let after_first = record_match_response(&db, "m1", "bob", Decision::Accept, NOW)
            .await
            .unwrap();
        assert_eq!(after_first.status, MatchStatus::Pending);
        assert_eq!(after_first.user2_response, Some(Decision::Accept));
        assert!(after_first.responded_at.is_none());

        let after_second = record_match_response(&db, "m1", "alice", Decision::Accept, NOW)
            .await
            .unwrap();
        assert_eq!(after_second.status, MatchStatus::Accepted);
        assert_eq!(after_second.responded_at.as_deref(), Some(NOW));
    }

    #[tokio::test]
    async fn single_reject_resolves_to_rejected() {
        let db = db_with_pair().await;
        created(&db, &proposal("m1", "alice", "bob")).await;

        let rejected = record_match_response(&db, "m1", "alice", Decision::Reject, NOW)
            .await
            .unwrap();
        assert_eq!(rejected.status, MatchStatus::Rejected);

        let err = record_match_response(&db, "m1", "bob", Decision::Accept, NOW)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TwinlinkError::MatchNotPending {
                status: MatchStatus::Rejected,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn response_validation_errors() {
        let db = db_with_pair().await;
        created(&db, &proposal("m1", "alice", "bob")).await;

        let err = record_match_response(&db, "m1", "carol", Decision::Accept, NOW)
            .await
            .unwrap_err();
        assert!(matches!(err, TwinlinkError::NotParticipant { .. }));

        record_match_response(&db, "m1", "alice", Decision::Accept, NOW)
            .await
            .unwrap();
        let err = record_match_response(&db, "m1", "alice", Decision::Reject, NOW)
            .await
            .unwrap_err();
        assert!(matches!(err, TwinlinkError::AlreadyResponded { .. }));

        let err = record_match_response(&db, "missing", "alice", Decision::Accept, NOW)
            .await
            .unwrap_err();
        assert!(matches!(err, TwinlinkError::NotFound { entity: "match", .. }));
    }

    #[tokio::test]
    async fn overdue_match_refuses_responses_without_writing() {
        let db = db_with_pair().await;
        created(&db, &proposal("m1", "alice", "bob")).await;

        let late = "2026-03-09T00:00:00.000Z";
        let err = record_match_response(&db, "m1", "alice", Decision::Accept, late)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TwinlinkError::MatchNotPending {
                status: MatchStatus::Expired,
                ..
            }
        ));
        let stored = get_match(&db, "m1").await.unwrap().unwrap();
        assert_eq!(stored.status, MatchStatus::Pending);
        assert!(stored.user1_response.is_none());
    }

    #[tokio::test]
    async fn expiry_frees_the_pair() {
        let db = db_with_pair().await;
        created(&db, &proposal("m1", "alice", "bob")).await;
        created(&db, &proposal("m2", "alice", "carol")).await;
        record_match_response(&db, "m2", "carol", Decision::Reject, NOW)
            .await
            .unwrap();

        let expired = expire_matches(&db, "2026-03-08T12:00:00.000Z").await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, "m1");
        assert_eq!(expired[0].status, MatchStatus::Expired);

        // Rejected matches are terminal and never expire.
        let m2 = get_match(&db, "m2").await.unwrap().unwrap();
        assert_eq!(m2.status, MatchStatus::Rejected);

        assert_eq!(
            open_match_counterparts(&db, "alice").await.unwrap(),
            vec!["carol".to_string()]
        );
        created(&db, &proposal("m3", "alice", "bob")).await;
    }

    #[tokio::test]
    async fn listing_filters_by_status() {
        let db = db_with_pair().await;
        created(&db, &proposal("m1", "alice", "bob")).await;
        created(&db, &proposal("m2", "alice", "carol")).await;
        record_match_response(&db, "m2", "alice", Decision::Reject, NOW)
            .await
            .unwrap();

        let all = list_matches_for_user(&db, "alice", None, Page::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        let pending =
            list_matches_for_user(&db, "alice", Some(MatchStatus::Pending), Page::default())
                .await
                .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "m1");
        let bob = list_matches_for_user(&db, "bob", None, Page::default())
            .await
            .unwrap();
        assert_eq!(bob.len(), 1);
    }

    #[tokio::test]
    async fn score_updates_only_while_pending() {
        let db = db_with_pair().await;
        created(&db, &proposal("m1", "alice", "bob")).await;

        assert!(update_pending_match_score(&db, "m1", 0.9).await.unwrap());
        record_match_response(&db, "m1", "bob", Decision::Reject, NOW)
            .await
            .unwrap();
        assert!(!update_pending_match_score(&db, "m1", 0.1).await.unwrap());
        assert_eq!(get_match(&db, "m1").await.unwrap().unwrap().score, 0.9);
    }

    #[test]
    fn status_resolution_table() {
        assert_eq!(resolve_status(Decision::Accept, None), MatchStatus::Pending);
        assert_eq!(
            resolve_status(Decision::Accept, Some(Decision::Accept)),
            MatchStatus::Accepted
        );
        assert_eq!(resolve_status(Decision::Reject, None), MatchStatus::Rejected);
        assert_eq!(
            resolve_status(Decision::Accept, Some(Decision::Reject)),
            MatchStatus::Rejected
        );
    }
}
