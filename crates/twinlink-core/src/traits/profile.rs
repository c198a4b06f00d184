// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read access to users and agents.

use async_trait::async_trait;

use crate::error::TwinlinkError;
use crate::types::{Agent, User};

/// Profile lookups needed by matching and conversation orchestration.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_user(&self, id: &str) -> Result<Option<User>, TwinlinkError>;

    async fn get_agent(&self, id: &str) -> Result<Option<Agent>, TwinlinkError>;

    /// Active agents whose owning user is also active.
    async fn list_active_agents(&self) -> Result<Vec<Agent>, TwinlinkError>;

    /// The single active agent of a user, if any.
    async fn active_agent_for_user(&self, user_id: &str)
        -> Result<Option<Agent>, TwinlinkError>;

    /// Every agent owned by one of `user_ids`, active or not.
    async fn agent_ids_for_users(&self, user_ids: &[String])
        -> Result<Vec<String>, TwinlinkError>;

    /// Bumps the agent's conversation counter and last-conversation time.
    async fn record_agent_conversation(&self, agent_id: &str, at: &str)
        -> Result<(), TwinlinkError>;
}
