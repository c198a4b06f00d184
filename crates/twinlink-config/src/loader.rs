// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading with Figment.
//!
//! Lookup order: `/etc/twinlink/twinlink.toml`, then
//! `~/.config/twinlink/twinlink.toml`, then `./twinlink.toml`, then
//! `TWINLINK_*` environment variables. Later layers win.

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::TwinlinkConfig;

/// Top-level sections, used to map flat env var names onto dotted keys.
const SECTIONS: &[&str] = &[
    "service",
    "storage",
    "matching",
    "conversation",
    "scheduler",
    "notification",
    "embedding",
    "generation",
    "gateway",
    "prometheus",
];

pub(crate) const SYSTEM_CONFIG: &str = "/etc/twinlink/twinlink.toml";
pub(crate) const LOCAL_CONFIG: &str = "twinlink.toml";

pub(crate) fn user_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("twinlink").join("twinlink.toml"))
        .unwrap_or_default()
}

/// Load configuration from the file hierarchy with env var overrides.
pub fn load_config() -> Result<TwinlinkConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only. No files, no env vars.
pub fn load_config_from_str(toml_content: &str) -> Result<TwinlinkConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TwinlinkConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from one explicit file with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<TwinlinkConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TwinlinkConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The Figment used by [`load_config`], before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(TwinlinkConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG))
        .merge(Toml::file(user_config_path()))
        .merge(Toml::file(LOCAL_CONFIG))
        .merge(env_provider())
}

/// `TWINLINK_SCHEDULER_MAX_RETRIES` maps to `scheduler.max_retries`.
///
/// Only the first underscore after a known section name becomes a dot, so
/// field names keep their own underscores.
fn env_provider() -> Env {
    Env::prefixed("TWINLINK_").map(|key| map_env_key(key.as_str()).into())
}

fn map_env_key(key: &str) -> String {
    SECTIONS
        .iter()
        .find_map(|section| {
            key.strip_prefix(section)
                .and_then(|rest| rest.strip_prefix('_'))
                .map(|field| format!("{section}.{field}"))
        })
        .unwrap_or_else(|| key.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_split_on_section_only() {
        assert_eq!(map_env_key("scheduler_max_retries"), "scheduler.max_retries");
        assert_eq!(
            map_env_key("conversation_inactivity_timeout_secs"),
            "conversation.inactivity_timeout_secs"
        );
        assert_eq!(map_env_key("gateway_bearer_token"), "gateway.bearer_token");
        assert_eq!(map_env_key("unknown_thing"), "unknown_thing");
    }

    #[test]
    fn env_overrides_file_values() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("custom.toml", "[matching]\nmin_score = 0.6\n")?;
            jail.set_env("TWINLINK_MATCHING_MIN_SCORE", "0.9");
            jail.set_env("TWINLINK_SCHEDULER_WORKERS", "2");

            let config = load_config_from_path(Path::new("custom.toml"))?;
            assert_eq!(config.matching.min_score, 0.9);
            assert_eq!(config.scheduler.workers, 2);
            Ok(())
        });
    }
}
