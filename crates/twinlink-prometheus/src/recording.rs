// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric descriptions.
//!
//! The domain crates record through the metrics-rs facade directly; this
//! module only names and describes what they emit.

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};

/// Register all Twinlink metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!("twinlink_jobs_enqueued_total", "Background jobs enqueued, by kind");
    describe_counter!("twinlink_jobs_completed_total", "Background jobs completed, by kind");
    describe_counter!("twinlink_jobs_retried_total", "Failed job attempts scheduled for retry");
    describe_counter!("twinlink_jobs_failed_total", "Jobs failed permanently");
    describe_histogram!(
        "twinlink_job_duration_seconds",
        Unit::Seconds,
        "Wall time of one job attempt"
    );

    describe_counter!("twinlink_embeddings_total", "Agent embeddings computed");
    describe_histogram!(
        "twinlink_embedding_latency_seconds",
        Unit::Seconds,
        "Embedding service latency"
    );

    describe_histogram!(
        "twinlink_discovery_candidates",
        "Candidates above the score threshold per discovery run"
    );
    describe_counter!("twinlink_matches_created_total", "Matches proposed");
    describe_counter!("twinlink_matches_expired_total", "Pending matches expired by the sweep");
    describe_counter!("twinlink_match_responses_total", "Match responses, by decision");

    describe_counter!("twinlink_conversations_started_total", "Conversations started, by kind");
    describe_counter!("twinlink_conversations_ended_total", "Conversations ended, by reason");
    describe_counter!("twinlink_messages_total", "Conversation messages appended");

    describe_counter!("twinlink_notifications_total", "Notifications published, by type");
    describe_gauge!("twinlink_live_channels", "Open live notification channels");
    describe_gauge!("twinlink_build_info", "Build metadata, always 1");
}

/// Publish the running version as `twinlink_build_info{version}`.
pub fn set_build_info(version: &str) {
    metrics::gauge!("twinlink_build_info", "version" => version.to_string()).set(1.0);
}
