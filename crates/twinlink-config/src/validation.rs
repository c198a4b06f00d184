// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic checks that serde attributes cannot express.

use crate::diagnostic::ConfigError;
use crate::model::TwinlinkConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration, collecting every problem.
pub fn validate_config(config: &TwinlinkConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !LOG_LEVELS.contains(&config.service.log_level.as_str()) {
        errors.push(ConfigError::invalid(format!(
            "service.log_level `{}` must be one of {}",
            config.service.log_level,
            LOG_LEVELS.join(", ")
        )));
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::invalid("storage.database_path must not be empty"));
    }

    let matching = &config.matching;
    for (key, value) in [
        ("matching.min_score", matching.min_score),
        ("matching.converse_min_score", matching.converse_min_score),
    ] {
        if !(0.0..=1.0).contains(&value) {
            errors.push(ConfigError::invalid(format!(
                "{key} must be within [0, 1], got {value}"
            )));
        }
    }
    if matching.expiry_days < 1 {
        errors.push(ConfigError::invalid(format!(
            "matching.expiry_days must be at least 1, got {}",
            matching.expiry_days
        )));
    }
    if matching.top_k == 0 {
        errors.push(ConfigError::invalid("matching.top_k must be at least 1"));
    }

    let conversation = &config.conversation;
    if conversation.max_turns < 1 {
        errors.push(ConfigError::invalid(format!(
            "conversation.max_turns must be at least 1, got {}",
            conversation.max_turns
        )));
    }
    if let Some(limit) = conversation.max_user_turns
        && limit < 1
    {
        errors.push(ConfigError::invalid(format!(
            "conversation.max_user_turns must be at least 1 when set, got {limit}"
        )));
    }
    if conversation.termination_marker.trim().is_empty() {
        errors.push(ConfigError::invalid(
            "conversation.termination_marker must not be empty",
        ));
    }

    let scheduler = &config.scheduler;
    if scheduler.workers == 0 {
        errors.push(ConfigError::invalid("scheduler.workers must be at least 1"));
    }
    if scheduler.attempt_timeout_secs == 0 {
        errors.push(ConfigError::invalid(
            "scheduler.attempt_timeout_secs must be at least 1",
        ));
    }
    if scheduler.backoff_base_ms > scheduler.backoff_max_secs.saturating_mul(1000) {
        errors.push(ConfigError::invalid(format!(
            "scheduler.backoff_base_ms ({}) exceeds scheduler.backoff_max_secs ({})",
            scheduler.backoff_base_ms, scheduler.backoff_max_secs
        )));
    }

    if config.notification.channel_buffer == 0 {
        errors.push(ConfigError::invalid(
            "notification.channel_buffer must be at least 1",
        ));
    }
    if config.notification.retention_days < 0 {
        errors.push(ConfigError::invalid(
            "notification.retention_days must not be negative",
        ));
    }

    for (key, interval) in [
        ("matching.discovery_interval_secs", matching.discovery_interval_secs),
        ("matching.expiry_sweep_interval_secs", matching.expiry_sweep_interval_secs),
        ("conversation.sweep_interval_secs", conversation.sweep_interval_secs),
        ("notification.purge_interval_secs", config.notification.purge_interval_secs),
    ] {
        if interval == 0 {
            errors.push(ConfigError::invalid(format!("{key} must be at least 1")));
        }
    }

    let host = config.gateway.host.trim();
    if config.gateway.enabled {
        let looks_like_host = !host.is_empty()
            && host
                .chars()
                .all(|c| c.is_alphanumeric() || matches!(c, '.' | '-' | ':'));
        if host.parse::<std::net::IpAddr>().is_err() && !looks_like_host {
            errors.push(ConfigError::invalid(format!(
                "gateway.host `{host}` is not a valid IP address or hostname"
            )));
        }
        if config.gateway.bearer_token.is_none() {
            tracing::warn!("gateway.bearer_token is not set; all API requests will be rejected");
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&TwinlinkConfig::default()).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = TwinlinkConfig::default();
        config.matching.min_score = 1.5;
        config.scheduler.workers = 0;
        config.conversation.max_turns = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        let text: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        assert!(text.iter().any(|t| t.contains("matching.min_score")));
        assert!(text.iter().any(|t| t.contains("scheduler.workers")));
        assert!(text.iter().any(|t| t.contains("conversation.max_turns")));
    }

    #[test]
    fn rejects_unknown_log_level() {
        let mut config = TwinlinkConfig::default();
        config.service.log_level = "loud".into();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn backoff_base_cannot_exceed_cap() {
        let mut config = TwinlinkConfig::default();
        config.scheduler.backoff_base_ms = 10_000;
        config.scheduler.backoff_max_secs = 5;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn disabled_gateway_skips_host_check() {
        let mut config = TwinlinkConfig::default();
        config.gateway.enabled = false;
        config.gateway.host = "not a host!".into();
        assert!(validate_config(&config).is_ok());
    }
}
