// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversations and their ordered messages.

use rusqlite::{Connection, OptionalExtension, Row, params};
use twinlink_core::TwinlinkError;
use twinlink_core::types::{
    AppendedTurn, Conversation, ConversationStatus, EndReason, Message, NewMessage, Page, Party,
};

use crate::database::{Database, map_tr_err};
use crate::queries::matches::link_conversation;
use crate::rows::{not_found, opt_json_col, parse_col, parse_opt_col, to_json};

const CONVERSATION_COLUMNS: &str = "id, kind, party_a_kind, party_a_id, party_b_kind, party_b_id, \
                                    status, match_id, turn_count, max_turns, end_reason, \
                                    failure_reason, last_message_at, ended_at, created_at, \
                                    updated_at";

const MESSAGE_COLUMNS: &str = "id, conversation_id, sequence, sender_kind, sender_id, kind, \
                               content, metadata, is_edited, replaces_id, created_at";

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        kind: parse_col(row, 1)?,
        party_a: Party::from_parts(parse_col(row, 2)?, row.get(3)?),
        party_b: Party::from_parts(parse_col(row, 4)?, row.get(5)?),
        status: parse_col(row, 6)?,
        match_id: row.get(7)?,
        turn_count: row.get(8)?,
        max_turns: row.get(9)?,
        end_reason: parse_opt_col(row, 10)?,
        failure_reason: row.get(11)?,
        last_message_at: row.get(12)?,
        ended_at: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sequence: row.get(2)?,
        sender: Party::from_parts(parse_col(row, 3)?, row.get(4)?),
        kind: parse_col(row, 5)?,
        content: row.get(6)?,
        metadata: opt_json_col(row, 7)?,
        is_edited: row.get(8)?,
        replaces_id: row.get(9)?,
        created_at: row.get(10)?,
    })
}

fn select_conversation(conn: &Connection, id: &str) -> rusqlite::Result<Option<Conversation>> {
    conn.query_row(
        &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"),
        params![id],
        conversation_from_row,
    )
    .optional()
}

/// Slot kinds must fit the conversation kind and the parties must differ.
fn check_participants(conversation: &Conversation) -> Result<(), TwinlinkError> {
    let (a, b) = conversation.kind.slot_kinds();
    if conversation.party_a.kind() != a || conversation.party_b.kind() != b {
        return Err(TwinlinkError::InvalidParticipants(format!(
            "{} conversation needs ({a}, {b}) slots, got ({}, {})",
            conversation.kind, conversation.party_a, conversation.party_b
        )));
    }
    if conversation.party_a == conversation.party_b {
        return Err(TwinlinkError::InvalidParticipants(format!(
            "{} cannot converse with itself",
            conversation.party_a
        )));
    }
    Ok(())
}

/// Insert an active conversation. A match conversation is linked to its
/// match in the same transaction; when the match is closed or already has
/// a conversation nothing is written and `false` is returned.
pub async fn create_conversation(
    db: &Database,
    conversation: &Conversation,
) -> Result<bool, TwinlinkError> {
    check_participants(conversation)?;
    let c = conversation.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            if let Some(match_id) = &c.match_id {
                if !link_conversation(&tx, match_id, &c.id, &c.created_at)? {
                    return Ok(false);
                }
            }
            tx.execute(
                "INSERT INTO conversations (id, kind, party_a_kind, party_a_id, party_b_kind,
                                            party_b_id, status, match_id, turn_count, max_turns,
                                            created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'active', ?7, 0, ?8, ?9, ?9)",
                params![
                    c.id,
                    c.kind.to_string(),
                    c.party_a.kind().to_string(),
                    c.party_a.id(),
                    c.party_b.kind().to_string(),
                    c.party_b.id(),
                    c.match_id,
                    c.max_turns,
                    c.created_at,
                ],
            )?;
            tx.commit()?;
            Ok(true)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_conversation(
    db: &Database,
    id: &str,
) -> Result<Option<Conversation>, TwinlinkError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| select_conversation(conn, &id))
        .await
        .map_err(map_tr_err)
}

/// Conversations with the user, or any of the user's agents, in a slot.
pub async fn list_conversations_for_user(
    db: &Database,
    user_id: &str,
    page: Page,
) -> Result<Vec<Conversation>, TwinlinkError> {
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONVERSATION_COLUMNS} FROM conversations
                 WHERE (party_a_kind = 'user' AND party_a_id = ?1)
                    OR (party_b_kind = 'user' AND party_b_id = ?1)
                    OR (party_a_kind = 'agent'
                        AND party_a_id IN (SELECT id FROM agents WHERE user_id = ?1))
                    OR (party_b_kind = 'agent'
                        AND party_b_id IN (SELECT id FROM agents WHERE user_id = ?1))
                 ORDER BY COALESCE(last_message_at, created_at) DESC, id
                 LIMIT ?2 OFFSET ?3"
            ))?;
            let rows = stmt.query_map(
                params![user_id, page.limit, page.offset],
                conversation_from_row,
            )?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Append one message and apply the turn limit, all in one transaction.
///
/// The next sequence is `max(sequence) + 1`; the `(conversation_id,
/// sequence)` unique constraint backs that up. The conversation ends with
/// `concluded` when the message says so, otherwise with `max_turns` once
/// the turn count reaches the limit.
pub async fn append_message(
    db: &Database,
    conversation_id: &str,
    message: &NewMessage,
    at: &str,
) -> Result<AppendedTurn, TwinlinkError> {
    let conversation_id = conversation_id.to_string();
    let message = message.clone();
    let at = at.to_string();
    db.connection()
        .call(move |conn| -> Result<Result<AppendedTurn, TwinlinkError>, rusqlite::Error> {
            let metadata = message.metadata.as_ref().map(to_json).transpose()?;
            let tx = conn.transaction()?;
            let Some(conversation) = select_conversation(&tx, &conversation_id)? else {
                return Ok(Err(not_found("conversation", &conversation_id)));
            };
            if conversation.status != ConversationStatus::Active {
                return Ok(Err(TwinlinkError::ConversationNotActive {
                    conversation_id,
                    status: conversation.status,
                }));
            }
            if !conversation.has_party(&message.sender) {
                return Ok(Err(TwinlinkError::InvalidParticipants(format!(
                    "{} is not a party of conversation {conversation_id}",
                    message.sender
                ))));
            }
            if let Some(original) = &message.replaces_id {
                let edited = tx.execute(
                    "UPDATE messages SET is_edited = 1
                     WHERE id = ?1 AND conversation_id = ?2
                       AND sender_kind = ?3 AND sender_id = ?4",
                    params![
                        original,
                        conversation_id,
                        message.sender.kind().to_string(),
                        message.sender.id()
                    ],
                )?;
                if edited == 0 {
                    return Ok(Err(not_found("message", original)));
                }
            }

            let sequence: i64 = tx.query_row(
                "SELECT COALESCE(MAX(sequence), 0) + 1 FROM messages WHERE conversation_id = ?1",
                params![conversation_id],
                |row| row.get(0),
            )?;
            let message_id = uuid::Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO messages (id, conversation_id, sequence, sender_kind, sender_id, kind,
                                       content, metadata, replaces_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    message_id,
                    conversation_id,
                    sequence,
                    message.sender.kind().to_string(),
                    message.sender.id(),
                    message.kind.to_string(),
                    message.content,
                    metadata,
                    message.replaces_id,
                    at,
                ],
            )?;

            let turns = conversation.turn_count + 1;
            let end_reason = if message.concludes {
                Some(EndReason::Concluded)
            } else if conversation.max_turns.is_some_and(|limit| turns >= limit) {
                Some(EndReason::MaxTurns)
            } else {
                None
            };
            match end_reason {
                Some(reason) => tx.execute(
                    "UPDATE conversations SET turn_count = ?2, last_message_at = ?3,
                     status = 'ended', end_reason = ?4, ended_at = ?3, updated_at = ?3
                     WHERE id = ?1",
                    params![conversation_id, turns, at, reason.to_string()],
                )?,
                None => tx.execute(
                    "UPDATE conversations SET turn_count = ?2, last_message_at = ?3,
                     updated_at = ?3
                     WHERE id = ?1",
                    params![conversation_id, turns, at],
                )?,
            };

            let stored = tx.query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![message_id],
                message_from_row,
            )?;
            let updated = select_conversation(&tx, &conversation_id)?;
            tx.commit()?;
            Ok(updated
                .map(|conversation| AppendedTurn {
                    message: stored,
                    conversation,
                })
                .ok_or_else(|| not_found("conversation", &conversation_id)))
        })
        .await
        .map_err(map_tr_err)?
}

/// Messages after `after_sequence`, oldest first.
pub async fn list_messages(
    db: &Database,
    conversation_id: &str,
    after_sequence: i64,
    limit: i64,
) -> Result<Vec<Message>, TwinlinkError> {
    let conversation_id = conversation_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE conversation_id = ?1 AND sequence > ?2
                 ORDER BY sequence
                 LIMIT ?3"
            ))?;
            let rows = stmt.query_map(
                params![conversation_id, after_sequence, limit],
                message_from_row,
            )?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// End an active conversation. `Ok(None)` if it had already left `active`.
pub async fn end_conversation(
    db: &Database,
    conversation_id: &str,
    reason: EndReason,
    failure: Option<&str>,
    at: &str,
) -> Result<Option<Conversation>, TwinlinkError> {
    let conversation_id = conversation_id.to_string();
    let failure = failure.map(str::to_string);
    let at = at.to_string();
    db.connection()
        .call(
            move |conn| -> Result<Result<Option<Conversation>, TwinlinkError>, rusqlite::Error> {
                let tx = conn.transaction()?;
                let changed = tx.execute(
                    "UPDATE conversations SET status = 'ended', end_reason = ?2,
                     failure_reason = ?3, ended_at = ?4, updated_at = ?4
                     WHERE id = ?1 AND status = 'active'",
                    params![conversation_id, reason.to_string(), failure, at],
                )?;
                let current = select_conversation(&tx, &conversation_id)?;
                tx.commit()?;
                Ok(match current {
                    None => Err(not_found("conversation", &conversation_id)),
                    Some(_) if changed == 0 => Ok(None),
                    Some(conversation) => Ok(Some(conversation)),
                })
            },
        )
        .await
        .map_err(map_tr_err)?
}

/// `ended -> archived` or `archived -> ended`.
pub async fn set_conversation_archived(
    db: &Database,
    conversation_id: &str,
    archived: bool,
    at: &str,
) -> Result<Conversation, TwinlinkError> {
    let conversation_id = conversation_id.to_string();
    let at = at.to_string();
    let (from, to) = if archived {
        (ConversationStatus::Ended, ConversationStatus::Archived)
    } else {
        (ConversationStatus::Archived, ConversationStatus::Ended)
    };
    db.connection()
        .call(move |conn| -> Result<Result<Conversation, TwinlinkError>, rusqlite::Error> {
            let tx = conn.transaction()?;
            let Some(current) = select_conversation(&tx, &conversation_id)? else {
                return Ok(Err(not_found("conversation", &conversation_id)));
            };
            if current.status != from {
                return Ok(Err(TwinlinkError::InvalidTransition {
                    entity: "conversation",
                    id: conversation_id,
                    from: current.status.to_string(),
                    to: to.to_string(),
                }));
            }
            tx.execute(
                "UPDATE conversations SET status = ?2, updated_at = ?3 WHERE id = ?1",
                params![conversation_id, to.to_string(), at],
            )?;
            let updated = select_conversation(&tx, &conversation_id)?;
            tx.commit()?;
            Ok(updated.ok_or_else(|| not_found("conversation", &conversation_id)))
        })
        .await
        .map_err(map_tr_err)?
}

/// Active conversations idle since `cutoff` or earlier.
pub async fn stale_conversations(
    db: &Database,
    cutoff: &str,
) -> Result<Vec<Conversation>, TwinlinkError> {
    let cutoff = cutoff.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONVERSATION_COLUMNS} FROM conversations
                 WHERE status = 'active' AND COALESCE(last_message_at, created_at) <= ?1
                 ORDER BY COALESCE(last_message_at, created_at)"
            ))?;
            let rows = stmt.query_map(params![cutoff], conversation_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}
