// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! All structs use `#[serde(deny_unknown_fields)]` so that a misspelled key
//! fails startup with a suggestion instead of being silently ignored.

use serde::{Deserialize, Serialize};

/// Top-level Twinlink configuration. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TwinlinkConfig {
    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    /// Match discovery and lifecycle.
    #[serde(default)]
    pub matching: MatchingConfig,

    /// Conversation limits and sweeps.
    #[serde(default)]
    pub conversation: ConversationConfig,

    /// Background job workers and retry policy.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub notification: NotificationConfig,

    /// External embedding service.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// External text generation service.
    #[serde(default)]
    pub generation: GenerationConfig,

    /// HTTP and WebSocket surface.
    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub prometheus: PrometheusConfig,
}

/// Service identity and logging.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "twinlink".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// SQLite storage settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    #[serde(default = "default_database_path")]
    pub database_path: String,

    #[serde(default = "default_true")]
    pub wal_mode: bool,

    /// Milliseconds SQLite waits on a locked database before failing.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: true,
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_local_dir()
        .map(|d| d.join("twinlink").join("twinlink.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("twinlink.db"))
        .display()
        .to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_true() -> bool {
    true
}

/// Match discovery settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MatchingConfig {
    /// Candidates below this score are dropped.
    #[serde(default = "default_min_score")]
    pub min_score: f64,

    /// Days a pending match stays open before expiring.
    #[serde(default = "default_expiry_days")]
    pub expiry_days: i64,

    /// Neighbours requested from the similarity index per discovery.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Enqueue a generated explanation for each new match.
    #[serde(default = "default_true")]
    pub generate_reasons: bool,

    /// Start an agent conversation for sufficiently strong matches.
    #[serde(default = "default_true")]
    pub auto_converse: bool,

    #[serde(default = "default_converse_min_score")]
    pub converse_min_score: f64,

    /// Seconds between full discovery sweeps.
    #[serde(default = "default_discovery_interval_secs")]
    pub discovery_interval_secs: u64,

    /// Seconds between expiry sweeps.
    #[serde(default = "default_expiry_sweep_interval_secs")]
    pub expiry_sweep_interval_secs: u64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            min_score: default_min_score(),
            expiry_days: default_expiry_days(),
            top_k: default_top_k(),
            generate_reasons: true,
            auto_converse: true,
            converse_min_score: default_converse_min_score(),
            discovery_interval_secs: default_discovery_interval_secs(),
            expiry_sweep_interval_secs: default_expiry_sweep_interval_secs(),
        }
    }
}

fn default_min_score() -> f64 {
    0.7
}

fn default_expiry_days() -> i64 {
    7
}

fn default_top_k() -> usize {
    5
}

fn default_converse_min_score() -> f64 {
    0.8
}

fn default_discovery_interval_secs() -> u64 {
    3600
}

fn default_expiry_sweep_interval_secs() -> u64 {
    300
}

/// Conversation settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConversationConfig {
    /// Turn limit for conversations that involve an agent.
    #[serde(default = "default_max_turns")]
    pub max_turns: i64,

    /// Turn limit for user-to-user conversations. Unbounded when unset.
    #[serde(default)]
    pub max_user_turns: Option<i64>,

    /// Seconds without a message before an active conversation is ended.
    #[serde(default = "default_inactivity_timeout_secs")]
    pub inactivity_timeout_secs: u64,

    /// Text an agent emits to close the conversation.
    #[serde(default = "default_termination_marker")]
    pub termination_marker: String,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            max_user_turns: None,
            inactivity_timeout_secs: default_inactivity_timeout_secs(),
            termination_marker: default_termination_marker(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_max_turns() -> i64 {
    10
}

fn default_inactivity_timeout_secs() -> u64 {
    1800
}

fn default_termination_marker() -> String {
    "[END_CONVERSATION]".to_string()
}

fn default_sweep_interval_secs() -> u64 {
    60
}

/// Background job scheduler settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Number of concurrent workers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Retries after the first attempt before a job fails permanently.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Per-attempt timeout.
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,

    /// First retry delay; doubles on each retry.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Cap on the retry delay.
    #[serde(default = "default_backoff_max_secs")]
    pub backoff_max_secs: u64,

    /// Idle workers poll the queue at this interval.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Lease slack added on top of the attempt timeout.
    #[serde(default = "default_lease_grace_secs")]
    pub lease_grace_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_retries: default_max_retries(),
            attempt_timeout_secs: default_attempt_timeout_secs(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_secs: default_backoff_max_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            lease_grace_secs: default_lease_grace_secs(),
        }
    }
}

fn default_workers() -> usize {
    4
}

fn default_max_retries() -> u32 {
    3
}

fn default_attempt_timeout_secs() -> u64 {
    1800
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_backoff_max_secs() -> u64 {
    300
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_lease_grace_secs() -> u64 {
    60
}

/// Notification delivery and retention.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NotificationConfig {
    /// Outbound buffer per live channel. Full buffers drop frames.
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer: usize,

    /// Read notifications older than this are purged.
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,

    #[serde(default = "default_purge_interval_secs")]
    pub purge_interval_secs: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            channel_buffer: default_channel_buffer(),
            retention_days: default_retention_days(),
            purge_interval_secs: default_purge_interval_secs(),
        }
    }
}

fn default_channel_buffer() -> usize {
    64
}

fn default_retention_days() -> i64 {
    30
}

fn default_purge_interval_secs() -> u64 {
    86400
}

/// OpenAI-compatible embedding endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingConfig {
    #[serde(default = "default_api_base_url")]
    pub base_url: String,

    /// API key. `None` falls back to the `OPENAI_API_KEY` environment variable.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_embedding_model")]
    pub model: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base_url(),
            api_key: None,
            model: default_embedding_model(),
        }
    }
}

fn default_api_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

/// OpenAI-compatible chat completion endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GenerationConfig {
    #[serde(default = "default_api_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_generation_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base_url(),
            api_key: None,
            model: default_generation_model(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_generation_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_tokens() -> u32 {
    400
}

/// HTTP/WebSocket gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_gateway_host")]
    pub host: String,

    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Shared secret required on every API request. `None` rejects all.
    #[serde(default)]
    pub bearer_token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_gateway_host(),
            port: default_gateway_port(),
            bearer_token: None,
        }
    }
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    3000
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PrometheusConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}
