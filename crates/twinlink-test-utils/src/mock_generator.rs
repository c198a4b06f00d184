// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock generation adapter for deterministic testing.
//!
//! Turn replies are popped from a FIFO queue. When the queue is empty a
//! default "mock reply" is returned.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use twinlink_core::traits::{GeneratedTurn, ReasonRequest, TurnRequest};
use twinlink_core::types::{AdapterType, HealthStatus};
use twinlink_core::{GenerationAdapter, PluginAdapter, TwinlinkError};

pub struct MockGenerator {
    replies: Mutex<VecDeque<String>>,
    compatibility: Option<f64>,
    turns: AtomicUsize,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            compatibility: Some(0.8),
            turns: AtomicUsize::new(0),
        }
    }

    pub fn with_replies(replies: Vec<String>) -> Self {
        Self {
            replies: Mutex::new(VecDeque::from(replies)),
            ..Self::new()
        }
    }

    /// Estimate attached to every generated turn.
    pub fn with_compatibility(mut self, compatibility: Option<f64>) -> Self {
        self.compatibility = compatibility;
        self
    }

    pub async fn add_reply(&self, text: impl Into<String>) {
        self.replies.lock().await.push_back(text.into());
    }

    /// Number of turns generated so far.
    pub fn turns(&self) -> usize {
        self.turns.load(Ordering::SeqCst)
    }
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockGenerator {
    fn name(&self) -> &str {
        "mock-generator"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Generation
    }

    async fn health_check(&self) -> Result<HealthStatus, TwinlinkError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), TwinlinkError> {
        Ok(())
    }
}

#[async_trait]
impl GenerationAdapter for MockGenerator {
    async fn generate_turn(&self, _request: TurnRequest) -> Result<GeneratedTurn, TwinlinkError> {
        self.turns.fetch_add(1, Ordering::SeqCst);
        let content = self
            .replies
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| "mock reply".to_string());
        Ok(GeneratedTurn {
            content,
            compatibility: self.compatibility,
        })
    }

    async fn explain_match(&self, request: ReasonRequest) -> Result<String, TwinlinkError> {
        Ok(format!(
            "{} and {} look like a good fit ({:.2})",
            request.first.name, request.second.name, request.score
        ))
    }
}
