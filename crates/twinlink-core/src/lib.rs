// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for Twinlink.
//!
//! This crate provides the trait definitions, error types, and domain types
//! used throughout the Twinlink workspace. Every backend and component
//! depends on it and nothing else in the workspace.

pub mod error;
pub mod traits;
pub mod types;

pub use error::TwinlinkError;
pub use types::{AdapterType, HealthStatus};

pub use traits::{
    ConversationOutcome, DomainEvent, EmbeddingAdapter, EventSink, GenerationAdapter,
    OutcomeSink, PluginAdapter, ProfileStore, SimilarityIndex, StorageAdapter,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_type_round_trips() {
        use std::str::FromStr;

        for variant in [
            AdapterType::Storage,
            AdapterType::Embedding,
            AdapterType::Generation,
            AdapterType::Observability,
        ] {
            let parsed = AdapterType::from_str(&variant.to_string()).expect("should parse back");
            assert_eq!(variant, parsed);
        }
    }

    #[test]
    fn health_status_variants() {
        assert_eq!(HealthStatus::Healthy, HealthStatus::Healthy);
        assert_ne!(HealthStatus::Degraded("slow".into()), HealthStatus::Healthy);
    }

    #[test]
    fn traits_are_object_safe() {
        fn _storage(_: &dyn StorageAdapter) {}
        fn _embedding(_: &dyn EmbeddingAdapter) {}
        fn _generation(_: &dyn GenerationAdapter) {}
        fn _index(_: &dyn SimilarityIndex) {}
        fn _events(_: &dyn EventSink) {}
        fn _outcomes(_: &dyn OutcomeSink) {}
    }

    #[test]
    fn event_names_are_stable() {
        let job = types::BackgroundJob {
            id: "j1".into(),
            kind: "match.discover".into(),
            payload: serde_json::json!({}),
            owner_user_id: None,
            status: types::JobStatus::Failed,
            progress: 0,
            retry_count: 3,
            max_retries: 3,
            result: None,
            error: Some("boom".into()),
            next_run_at: "2026-01-01T00:00:00.000Z".into(),
            locked_until: None,
            started_at: None,
            completed_at: None,
            created_at: "2026-01-01T00:00:00.000Z".into(),
            updated_at: "2026-01-01T00:00:00.000Z".into(),
        };
        assert!(job.retries_exhausted());
        assert_eq!(DomainEvent::JobFailed(job).name(), "job_failed");
    }
}
