// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Users and agents.

use rusqlite::{OptionalExtension, Row, params};
use twinlink_core::TwinlinkError;
use twinlink_core::types::{Agent, PrivacySettings, User};

use crate::database::{Database, map_tr_err};
use crate::rows::{json_col, not_found, to_json};

const USER_COLUMNS: &str = "id, email, display_name, bio, profile_visible, discoverable, \
                            is_active, created_at, updated_at";

const AGENT_COLUMNS: &str = "a.id, a.user_id, a.name, a.personality_type, \
                             a.persona_description, a.conversation_style, a.background_context, \
                             a.goals, a.interests, a.is_active, a.total_conversations, \
                             a.last_conversation_at, a.created_at, a.updated_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        display_name: row.get(2)?,
        bio: row.get(3)?,
        privacy: PrivacySettings {
            profile_visible: row.get(4)?,
            discoverable: row.get(5)?,
        },
        is_active: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn agent_from_row(row: &Row<'_>) -> rusqlite::Result<Agent> {
    Ok(Agent {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        personality_type: row.get(3)?,
        persona_description: row.get(4)?,
        conversation_style: json_col(row, 5)?,
        background_context: row.get(6)?,
        goals: json_col(row, 7)?,
        interests: json_col(row, 8)?,
        is_active: row.get(9)?,
        total_conversations: row.get(10)?,
        last_conversation_at: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

fn select_agent(conn: &rusqlite::Connection, id: &str) -> rusqlite::Result<Option<Agent>> {
    conn.query_row(
        &format!("SELECT {AGENT_COLUMNS} FROM agents a WHERE a.id = ?1"),
        params![id],
        agent_from_row,
    )
    .optional()
}

pub async fn create_user(db: &Database, user: &User) -> Result<(), TwinlinkError> {
    let user = user.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO users (id, email, display_name, bio, profile_visible, discoverable,
                                    is_active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    user.id,
                    user.email,
                    user.display_name,
                    user.bio,
                    user.privacy.profile_visible,
                    user.privacy.discoverable,
                    user.is_active,
                    user.created_at,
                    user.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_user(db: &Database, id: &str) -> Result<Option<User>, TwinlinkError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                user_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn set_user_active(db: &Database, id: &str, active: bool) -> Result<(), TwinlinkError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Result<(), TwinlinkError>, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE users SET is_active = ?2,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![id, active],
            )?;
            if changed == 0 {
                return Ok(Err(not_found("user", &id)));
            }
            Ok(Ok(()))
        })
        .await
        .map_err(map_tr_err)?
}

pub async fn set_user_privacy(
    db: &Database,
    id: &str,
    privacy: PrivacySettings,
) -> Result<(), TwinlinkError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Result<(), TwinlinkError>, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE users SET profile_visible = ?2, discoverable = ?3,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![id, privacy.profile_visible, privacy.discoverable],
            )?;
            if changed == 0 {
                return Ok(Err(not_found("user", &id)));
            }
            Ok(Ok(()))
        })
        .await
        .map_err(map_tr_err)?
}

/// Insert an agent. An active agent displaces the owner's current one.
pub async fn create_agent(db: &Database, agent: &Agent) -> Result<(), TwinlinkError> {
    let agent = agent.clone();
    db.connection()
        .call(move |conn| {
            let style = to_json(&agent.conversation_style)?;
            let goals = to_json(&agent.goals)?;
            let interests = to_json(&agent.interests)?;
            let tx = conn.transaction()?;
            if agent.is_active {
                tx.execute(
                    "UPDATE agents SET is_active = 0, updated_at = ?2
                     WHERE user_id = ?1 AND is_active = 1",
                    params![agent.user_id, agent.updated_at],
                )?;
            }
            tx.execute(
                "INSERT INTO agents (id, user_id, name, personality_type, persona_description,
                                     conversation_style, background_context, goals, interests,
                                     is_active, total_conversations, last_conversation_at,
                                     created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    agent.id,
                    agent.user_id,
                    agent.name,
                    agent.personality_type,
                    agent.persona_description,
                    style,
                    agent.background_context,
                    goals,
                    interests,
                    agent.is_active,
                    agent.total_conversations,
                    agent.last_conversation_at,
                    agent.created_at,
                    agent.updated_at,
                ],
            )?;
            tx.commit()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_agent(db: &Database, id: &str) -> Result<Option<Agent>, TwinlinkError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| select_agent(conn, &id))
        .await
        .map_err(map_tr_err)
}

pub async fn list_active_agents(db: &Database) -> Result<Vec<Agent>, TwinlinkError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {AGENT_COLUMNS} FROM agents a
                 JOIN users u ON u.id = a.user_id
                 WHERE a.is_active = 1 AND u.is_active = 1
                 ORDER BY a.created_at, a.id"
            ))?;
            let rows = stmt.query_map([], agent_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn active_agent_for_user(
    db: &Database,
    user_id: &str,
) -> Result<Option<Agent>, TwinlinkError> {
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {AGENT_COLUMNS} FROM agents a
                     WHERE a.user_id = ?1 AND a.is_active = 1"
                ),
                params![user_id],
                agent_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Every agent owned by one of `user_ids`, active or not.
pub async fn agent_ids_for_users(
    db: &Database,
    user_ids: &[String],
) -> Result<Vec<String>, TwinlinkError> {
    let user_ids = user_ids.to_vec();
    db.connection()
        .call(move |conn| {
            let mut stmt =
                conn.prepare("SELECT id FROM agents WHERE user_id = ?1 ORDER BY created_at, id")?;
            let mut ids = Vec::new();
            for user_id in &user_ids {
                let rows = stmt.query_map(params![user_id], |row| row.get::<_, String>(0))?;
                for id in rows {
                    ids.push(id?);
                }
            }
            Ok(ids)
        })
        .await
        .map_err(map_tr_err)
}

/// Make `agent_id` its owner's only active agent.
pub async fn activate_agent(db: &Database, agent_id: &str) -> Result<Agent, TwinlinkError> {
    let agent_id = agent_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Result<Agent, TwinlinkError>, rusqlite::Error> {
            let tx = conn.transaction()?;
            let Some(agent) = select_agent(&tx, &agent_id)? else {
                return Ok(Err(not_found("agent", &agent_id)));
            };
            tx.execute(
                "UPDATE agents SET is_active = 0,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE user_id = ?1 AND id != ?2 AND is_active = 1",
                params![agent.user_id, agent_id],
            )?;
            tx.execute(
                "UPDATE agents SET is_active = 1,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![agent_id],
            )?;
            let activated = select_agent(&tx, &agent_id)?;
            tx.commit()?;
            Ok(activated.ok_or_else(|| not_found("agent", &agent_id)))
        })
        .await
        .map_err(map_tr_err)?
}

pub async fn deactivate_agent(db: &Database, agent_id: &str) -> Result<(), TwinlinkError> {
    let agent_id = agent_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Result<(), TwinlinkError>, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE agents SET is_active = 0,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![agent_id],
            )?;
            if changed == 0 {
                return Ok(Err(not_found("agent", &agent_id)));
            }
            Ok(Ok(()))
        })
        .await
        .map_err(map_tr_err)?
}

pub async fn record_agent_conversation(
    db: &Database,
    agent_id: &str,
    at: &str,
) -> Result<(), TwinlinkError> {
    let agent_id = agent_id.to_string();
    let at = at.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE agents SET total_conversations = total_conversations + 1,
                 last_conversation_at = ?2, updated_at = ?2
                 WHERE id = ?1",
                params![agent_id, at],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
