// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Generation adapter trait for agent turns and match explanations.

use async_trait::async_trait;

use crate::error::TwinlinkError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{Agent, Message, Party};

/// Everything needed to generate the next agent turn.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub conversation_id: String,
    /// The agent speaking this turn.
    pub speaker: Agent,
    /// Display name of the other side.
    pub counterpart_name: String,
    pub counterpart: Party,
    /// Prior messages, oldest first.
    pub transcript: Vec<Message>,
    /// Marker the speaker appends to close the conversation.
    pub termination_marker: String,
    /// Turns left before the hard limit, if any.
    pub remaining_turns: Option<i64>,
}

/// One generated turn.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedTurn {
    pub content: String,
    /// The speaker's own compatibility estimate in `[0, 1]`, if offered.
    pub compatibility: Option<f64>,
}

/// Inputs for a human-readable match explanation.
#[derive(Debug, Clone)]
pub struct ReasonRequest {
    pub first: Agent,
    pub second: Agent,
    pub score: f64,
}

/// Adapter for an external text generation service.
#[async_trait]
pub trait GenerationAdapter: PluginAdapter {
    /// Produces the next turn for `request.speaker`.
    async fn generate_turn(&self, request: TurnRequest) -> Result<GeneratedTurn, TwinlinkError>;

    /// Produces a short explanation of why two agents were matched.
    async fn explain_match(&self, request: ReasonRequest) -> Result<String, TwinlinkError>;
}
