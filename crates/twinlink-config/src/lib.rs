// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for Twinlink.
//!
//! TOML files are merged over compiled defaults, strict about unknown keys,
//! overridable with `TWINLINK_*` environment variables, and reported as
//! miette diagnostics with typo suggestions.
//!
//! ```no_run
//! use twinlink_config::load_and_validate;
//!
//! let config = load_and_validate().expect("config errors");
//! println!("max turns: {}", config.conversation.max_turns);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

pub use diagnostic::{ConfigError, render_errors};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::TwinlinkConfig;

/// Load from the file hierarchy and validate.
pub fn load_and_validate() -> Result<TwinlinkConfig, Vec<ConfigError>> {
    let config = loader::load_config()
        .map_err(|err| diagnostic::figment_to_config_errors(err, &collect_toml_sources()))?;
    validation::validate_config(&config)?;
    Ok(config)
}

/// Load from one explicit file and validate.
pub fn load_and_validate_path(path: &std::path::Path) -> Result<TwinlinkConfig, Vec<ConfigError>> {
    let config = loader::load_config_from_path(path).map_err(|err| {
        let sources = std::fs::read_to_string(path)
            .map(|content| vec![(path.display().to_string(), content)])
            .unwrap_or_default();
        diagnostic::figment_to_config_errors(err, &sources)
    })?;
    validation::validate_config(&config)?;
    Ok(config)
}

/// Load from a TOML string and validate.
pub fn load_and_validate_str(toml_content: &str) -> Result<TwinlinkConfig, Vec<ConfigError>> {
    let config = loader::load_config_from_str(toml_content).map_err(|err| {
        let sources = vec![("<inline>".to_string(), toml_content.to_string())];
        diagnostic::figment_to_config_errors(err, &sources)
    })?;
    validation::validate_config(&config)?;
    Ok(config)
}

/// Contents of every config file that exists, for error span lookup.
fn collect_toml_sources() -> Vec<(String, String)> {
    let local = std::env::current_dir()
        .map(|d| d.join(loader::LOCAL_CONFIG))
        .unwrap_or_else(|_| loader::LOCAL_CONFIG.into());

    [
        local,
        loader::user_config_path(),
        std::path::PathBuf::from(loader::SYSTEM_CONFIG),
    ]
    .into_iter()
    .filter_map(|path| {
        std::fs::read_to_string(&path)
            .ok()
            .map(|content| (path.display().to_string(), content))
    })
    .collect()
}
