// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenAI-compatible adapters for Twinlink.
//!
//! [`OpenAiEmbedder`] implements [`EmbeddingAdapter`](twinlink_core::EmbeddingAdapter)
//! over `/embeddings`; [`OpenAiGenerator`] implements
//! [`GenerationAdapter`](twinlink_core::GenerationAdapter) over
//! `/chat/completions`. Any service speaking the same wire format works.

pub mod client;
pub mod embedder;
pub mod generator;
pub mod types;

pub use client::OpenAiClient;
pub use embedder::OpenAiEmbedder;
pub use generator::OpenAiGenerator;

use twinlink_core::TwinlinkError;

/// Environment variable consulted when no key is configured.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Resolves the API key: config value first, then `OPENAI_API_KEY`.
pub fn resolve_api_key(config_key: &Option<String>) -> Result<String, TwinlinkError> {
    if let Some(key) = config_key
        && !key.is_empty()
    {
        return Ok(key.clone());
    }

    std::env::var(API_KEY_ENV).map_err(|_| {
        TwinlinkError::Config(format!(
            "API key not found. Set api_key in the embedding/generation config or {API_KEY_ENV}."
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn configured_key_wins() {
        // SAFETY: test-only env mutation, serialized with the other env tests.
        unsafe { std::env::set_var(API_KEY_ENV, "sk-env") };
        let key = resolve_api_key(&Some("sk-config".into()));
        unsafe { std::env::remove_var(API_KEY_ENV) };

        assert_eq!(key.unwrap(), "sk-config");
    }

    #[test]
    #[serial]
    fn empty_key_falls_back_to_env() {
        unsafe { std::env::set_var(API_KEY_ENV, "sk-env") };
        let key = resolve_api_key(&Some(String::new()));
        unsafe { std::env::remove_var(API_KEY_ENV) };

        assert_eq!(key.unwrap(), "sk-env");
    }

    #[test]
    #[serial]
    fn missing_key_is_a_config_error() {
        unsafe { std::env::remove_var(API_KEY_ENV) };
        let err = resolve_api_key(&None).unwrap_err();
        assert!(matches!(err, TwinlinkError::Config(_)));
        assert!(err.to_string().contains(API_KEY_ENV));
    }
}
