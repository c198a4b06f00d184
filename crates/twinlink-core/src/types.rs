// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across adapter traits and the Twinlink components.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::TwinlinkError;

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the type of adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Storage,
    Embedding,
    Generation,
    Observability,
}

// --- Lifecycle enums ---

/// Lifecycle state of a match.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Pending,
    Accepted,
    Rejected,
    Expired,
}

impl MatchStatus {
    /// Terminal states never change again.
    pub fn is_terminal(self) -> bool {
        !matches!(self, MatchStatus::Pending)
    }
}

/// A user's answer to a match proposal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Accept,
    Reject,
}

/// Whether each party slot of a conversation holds a user or an agent.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    AgentToAgent,
    UserToUser,
    UserToAgent,
}

impl ConversationKind {
    /// Party kinds required in slot A and slot B.
    pub fn slot_kinds(self) -> (PartyKind, PartyKind) {
        match self {
            ConversationKind::AgentToAgent => (PartyKind::Agent, PartyKind::Agent),
            ConversationKind::UserToUser => (PartyKind::User, PartyKind::User),
            ConversationKind::UserToAgent => (PartyKind::User, PartyKind::Agent),
        }
    }

    /// True when at least one slot is driven by turn generation.
    pub fn involves_agent(self) -> bool {
        !matches!(self, ConversationKind::UserToUser)
    }
}

/// Conversation lifecycle state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Active,
    Ended,
    Archived,
}

/// Why a conversation left the `active` state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    MaxTurns,
    Concluded,
    InactivityTimeout,
    Failed,
    Closed,
}

/// Kind of entity occupying a conversation slot.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PartyKind {
    User,
    Agent,
}

/// A conversation participant: either a user or an agent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Party {
    User(String),
    Agent(String),
}

impl Party {
    /// Build a party from its stored columns.
    pub fn from_parts(kind: PartyKind, id: String) -> Self {
        match kind {
            PartyKind::User => Party::User(id),
            PartyKind::Agent => Party::Agent(id),
        }
    }

    pub fn kind(&self) -> PartyKind {
        match self {
            Party::User(_) => PartyKind::User,
            Party::Agent(_) => PartyKind::Agent,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Party::User(id) | Party::Agent(id) => id,
        }
    }
}

impl std::fmt::Display for Party {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}

/// Message payload kind.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    System,
}

/// Background job lifecycle state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Retrying,
}

// --- Profile entities ---

/// Privacy flags controlling visibility and discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivacySettings {
    /// Profile may be shown to other users.
    pub profile_visible: bool,
    /// User may be proposed as a match counterpart.
    pub discoverable: bool,
}

impl Default for PrivacySettings {
    fn default() -> Self {
        Self {
            profile_visible: true,
            discoverable: true,
        }
    }
}

/// A platform user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub bio: Option<String>,
    pub privacy: PrivacySettings,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// How an agent tends to talk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationStyle {
    pub tone: String,
    pub enthusiasm_level: String,
    pub technical_depth: String,
}

impl Default for ConversationStyle {
    fn default() -> Self {
        Self {
            tone: "friendly".to_string(),
            enthusiasm_level: "moderate".to_string(),
            technical_depth: "medium".to_string(),
        }
    }
}

/// A user's digital twin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub personality_type: String,
    pub persona_description: String,
    pub conversation_style: ConversationStyle,
    pub background_context: String,
    pub goals: Vec<String>,
    pub interests: Vec<String>,
    pub is_active: bool,
    /// Denormalized count of conversations this agent took part in.
    pub total_conversations: i64,
    pub last_conversation_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A stored vector for one entity. Superseded rows are kept for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub id: String,
    pub entity_type: String,
    pub entity_id: String,
    #[serde(skip)]
    pub vector: Vec<f32>,
    pub model: String,
    pub is_current: bool,
    pub superseded_by: Option<String>,
    pub created_at: String,
}

// --- Match ---

/// A proposed or resolved pairing of two users.
///
/// `user1_id` is always the lexicographically smaller id so that the
/// unordered pair has exactly one stored representation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub id: String,
    pub user1_id: String,
    pub user2_id: String,
    pub agent1_id: String,
    pub agent2_id: String,
    pub score: f64,
    pub reason: Option<String>,
    pub status: MatchStatus,
    pub user1_response: Option<Decision>,
    pub user2_response: Option<Decision>,
    pub conversation_id: Option<String>,
    pub expires_at: String,
    pub responded_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Match {
    /// True if `user_id` is one of the two parties.
    pub fn involves(&self, user_id: &str) -> bool {
        self.user1_id == user_id || self.user2_id == user_id
    }

    /// The other party of the match, if `user_id` is a participant.
    pub fn counterpart(&self, user_id: &str) -> Option<&str> {
        if self.user1_id == user_id {
            Some(&self.user2_id)
        } else if self.user2_id == user_id {
            Some(&self.user1_id)
        } else {
            None
        }
    }

    /// The recorded response of `user_id`'s side.
    pub fn response_of(&self, user_id: &str) -> Option<Decision> {
        if self.user1_id == user_id {
            self.user1_response
        } else if self.user2_id == user_id {
            self.user2_response
        } else {
            None
        }
    }
}

/// Result of an idempotent match insert.
#[derive(Debug, Clone)]
pub enum MatchInsert {
    /// No open match existed; this one was stored.
    Created(Match),
    /// An open match for the pair already exists.
    Existing(Match),
}

// --- Conversation ---

/// A bounded exchange between two parties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub kind: ConversationKind,
    pub party_a: Party,
    pub party_b: Party,
    pub status: ConversationStatus,
    pub match_id: Option<String>,
    pub turn_count: i64,
    /// Turn limit fixed at creation, `None` for unbounded.
    pub max_turns: Option<i64>,
    pub end_reason: Option<EndReason>,
    pub failure_reason: Option<String>,
    pub last_message_at: Option<String>,
    pub ended_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Conversation {
    pub fn has_party(&self, party: &Party) -> bool {
        &self.party_a == party || &self.party_b == party
    }

    /// The party facing `party`, if `party` takes part.
    pub fn counterpart(&self, party: &Party) -> Option<&Party> {
        if &self.party_a == party {
            Some(&self.party_b)
        } else if &self.party_b == party {
            Some(&self.party_a)
        } else {
            None
        }
    }

    /// Timestamp of the last message, or creation if none yet.
    pub fn last_activity(&self) -> &str {
        self.last_message_at.as_deref().unwrap_or(&self.created_at)
    }
}

/// One immutable conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sequence: i64,
    pub sender: Party,
    pub kind: MessageKind,
    pub content: String,
    pub metadata: Option<serde_json::Value>,
    pub is_edited: bool,
    pub replaces_id: Option<String>,
    pub created_at: String,
}

/// A message about to be appended.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub sender: Party,
    pub kind: MessageKind,
    pub content: String,
    pub metadata: Option<serde_json::Value>,
    /// The sender signalled the natural end of the conversation.
    pub concludes: bool,
    /// Earlier message this one edits.
    pub replaces_id: Option<String>,
}

impl NewMessage {
    /// A plain text turn.
    pub fn text(sender: Party, content: impl Into<String>) -> Self {
        Self {
            sender,
            kind: MessageKind::Text,
            content: content.into(),
            metadata: None,
            concludes: false,
            replaces_id: None,
        }
    }
}

/// The stored message plus the conversation state right after the append.
#[derive(Debug, Clone)]
pub struct AppendedTurn {
    pub message: Message,
    pub conversation: Conversation,
}

// --- Jobs and notifications ---

/// A unit of asynchronous work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackgroundJob {
    pub id: String,
    pub kind: String,
    pub payload: serde_json::Value,
    pub owner_user_id: Option<String>,
    pub status: JobStatus,
    pub progress: u8,
    pub retry_count: u32,
    pub max_retries: u32,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub next_run_at: String,
    pub locked_until: Option<String>,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl BackgroundJob {
    pub fn retries_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}

/// A durable, user-scoped record of a state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub content: String,
    pub data: serde_json::Value,
    pub is_read: bool,
    pub read_at: Option<String>,
    pub created_at: String,
}

/// Offset pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: i64,
    pub limit: i64,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

// --- Well-known names ---

/// Entity type under which agent embeddings are stored.
pub const AGENT_ENTITY: &str = "agent";

/// Job kinds understood by the registered handlers.
pub mod job_kinds {
    pub const EMBED_AGENT: &str = "agent.embed";
    pub const DISCOVER_MATCHES: &str = "match.discover";
    pub const DISCOVERY_SWEEP: &str = "match.discovery_sweep";
    pub const EXPIRE_MATCHES: &str = "match.expire";
    pub const MATCH_REASON: &str = "match.reason";
    pub const START_CONVERSATION: &str = "conversation.start";
    pub const CONVERSATION_TURN: &str = "conversation.turn";
    pub const INACTIVITY_SWEEP: &str = "conversation.inactivity_sweep";
    pub const PURGE_NOTIFICATIONS: &str = "notification.purge";
}

/// Notification `type` values.
pub mod notification_types {
    pub const MATCH_FOUND: &str = "match_found";
    pub const MATCH_ACCEPTED: &str = "match_accepted";
    pub const MESSAGE_RECEIVED: &str = "message_received";
    pub const CONVERSATION_ENDED: &str = "conversation_ended";
    pub const JOB_FAILED: &str = "job_failed";
}

// --- Timestamps ---

/// Fixed-width UTC format matching SQLite's `strftime('%Y-%m-%dT%H:%M:%fZ')`,
/// so stored timestamps compare correctly as text.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// Parse a stored timestamp.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, TwinlinkError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| TwinlinkError::Corrupt(format!("invalid timestamp `{value}`: {e}")))
}
