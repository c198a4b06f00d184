// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixtures for tests in this and downstream crates.

use std::sync::Arc;

use twinlink_core::types::{Agent, ConversationStyle, PrivacySettings, User};
use twinlink_core::{StorageAdapter, TwinlinkError};

use crate::adapter::SqliteStorage;
use crate::database::Database;

pub const CREATED: &str = "2026-01-01T00:00:00.000Z";

pub fn user(id: &str) -> User {
    User {
        id: id.into(),
        email: format!("{id}@example.com"),
        display_name: id.to_uppercase(),
        bio: None,
        privacy: PrivacySettings::default(),
        is_active: true,
        created_at: CREATED.into(),
        updated_at: CREATED.into(),
    }
}

pub fn agent(id: &str, user_id: &str) -> Agent {
    Agent {
        id: id.into(),
        user_id: user_id.into(),
        name: format!("{user_id}'s twin"),
        personality_type: "explorer".into(),
        persona_description: "Curious and upbeat".into(),
        conversation_style: ConversationStyle::default(),
        background_context: String::new(),
        goals: vec![],
        interests: vec![],
        is_active: true,
        total_conversations: 0,
        last_conversation_at: None,
        created_at: CREATED.into(),
        updated_at: CREATED.into(),
    }
}

/// Initialized in-memory storage.
pub async fn memory_storage() -> Result<Arc<SqliteStorage>, TwinlinkError> {
    let db = Database::open_in_memory().await?;
    Ok(Arc::new(SqliteStorage::from_database(db)))
}

/// Creates one user per entry with an active agent `agent-{user}`.
pub async fn seed_users_with_agents(
    storage: &dyn StorageAdapter,
    users: &[&str],
) -> Result<Vec<Agent>, TwinlinkError> {
    let mut agents = Vec::with_capacity(users.len());
    for id in users {
        storage.create_user(&user(id)).await?;
        let agent = agent(&format!("agent-{id}"), id);
        storage.create_agent(&agent).await?;
        agents.push(agent);
    }
    Ok(agents)
}
