// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Helpers for generated turn content.

use serde_json::json;
use twinlink_core::types::Message;

/// Metadata key holding a turn's compatibility estimate.
pub const COMPATIBILITY_KEY: &str = "compatibility";

/// Remove every occurrence of `marker`. Returns the cleaned content and
/// whether the marker was present.
pub fn strip_marker(content: &str, marker: &str) -> (String, bool) {
    if marker.is_empty() || !content.contains(marker) {
        return (content.trim().to_string(), false);
    }
    (content.replace(marker, "").trim().to_string(), true)
}

pub fn compatibility_metadata(estimate: Option<f64>) -> Option<serde_json::Value> {
    estimate.map(|value| json!({ COMPATIBILITY_KEY: value }))
}

/// Mean of the compatibility estimates attached to `messages`.
pub fn mean_compatibility(messages: &[Message]) -> Option<f64> {
    let estimates: Vec<f64> = messages
        .iter()
        .filter_map(|m| m.metadata.as_ref()?.get(COMPATIBILITY_KEY)?.as_f64())
        .collect();
    if estimates.is_empty() {
        return None;
    }
    Some(estimates.iter().sum::<f64>() / estimates.len() as f64)
}
