// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for Twinlink.
//!
//! One enum covers the whole workspace. Variants fall into three classes:
//!
//! - **validation**: caller mistakes surfaced synchronously, never retried;
//! - **transient**: infrastructure trouble the job scheduler retries;
//! - **fatal**: malformed state or misconfiguration, logged and surfaced.

use thiserror::Error;

use crate::types::{ConversationStatus, MatchStatus};

/// The primary error type used across all Twinlink crates.
#[derive(Debug, Error)]
pub enum TwinlinkError {
    /// Configuration errors (invalid TOML, missing required fields, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, contention).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Embedding or generation service errors (unavailable, bad response).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Live delivery transport errors.
    #[error("channel error: {message}")]
    Channel {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Conversation party slots do not fit the declared conversation kind.
    #[error("invalid participants: {0}")]
    InvalidParticipants(String),

    /// The user is not one of the two parties of the match.
    #[error("user {user_id} is not a participant of match {match_id}")]
    NotParticipant { match_id: String, user_id: String },

    /// The user's side of the match already carries a response.
    #[error("user {user_id} already responded to match {match_id}")]
    AlreadyResponded { match_id: String, user_id: String },

    /// The match is no longer accepting responses.
    #[error("match {match_id} is not pending (status: {status})")]
    MatchNotPending {
        match_id: String,
        status: MatchStatus,
    },

    /// The conversation no longer accepts turns.
    #[error("conversation {conversation_id} is not active (status: {status})")]
    ConversationNotActive {
        conversation_id: String,
        status: ConversationStatus,
    },

    /// A lifecycle transition that the state machine does not allow.
    #[error("{entity} {id} cannot move from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        id: String,
        from: String,
        to: String,
    },

    /// Persisted state that cannot be interpreted.
    #[error("corrupt persisted state: {0}")]
    Corrupt(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl TwinlinkError {
    /// Caller errors that are reported immediately and never retried.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            TwinlinkError::NotFound { .. }
                | TwinlinkError::InvalidParticipants(_)
                | TwinlinkError::NotParticipant { .. }
                | TwinlinkError::AlreadyResponded { .. }
                | TwinlinkError::MatchNotPending { .. }
                | TwinlinkError::ConversationNotActive { .. }
                | TwinlinkError::InvalidTransition { .. }
        )
    }

    /// Infrastructure errors that a retry may recover from.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TwinlinkError::Storage { .. }
                | TwinlinkError::Provider { .. }
                | TwinlinkError::Channel { .. }
                | TwinlinkError::Timeout { .. }
        )
    }

    /// Shorthand for a provider failure without an underlying source.
    pub fn provider(message: impl Into<String>) -> Self {
        TwinlinkError::Provider {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a storage failure described by a message.
    pub fn storage(message: impl Into<String>) -> Self {
        TwinlinkError::Storage {
            source: message.into().into(),
        }
    }
}
