// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Twinlink - agent-driven matchmaking and conversation orchestration.
//!
//! This is the binary entry point for the Twinlink service.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod serve;
mod services;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::IntoDiagnostic;
use twinlink_config::TwinlinkConfig;

/// Twinlink - agent-driven matchmaking and conversation orchestration.
#[derive(Parser, Debug)]
#[command(name = "twinlink", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard hierarchy.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run workers, periodic sweeps and the gateway until interrupted.
    Serve,
    /// Apply pending database migrations and exit.
    Migrate,
    /// Enqueue every periodic sweep once, run the queue dry and exit.
    Sweep,
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(errors) => {
            twinlink_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    serve::init_tracing(&config.service.log_level);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve::run_serve(config).await.into_diagnostic(),
        Commands::Migrate => serve::run_migrate(config).await.into_diagnostic(),
        Commands::Sweep => serve::run_sweep(config).await.into_diagnostic(),
    }
}

fn load_config(
    path: Option<&std::path::Path>,
) -> Result<TwinlinkConfig, Vec<twinlink_config::ConfigError>> {
    match path {
        Some(path) => twinlink_config::load_and_validate_path(path),
        None => twinlink_config::load_and_validate(),
    }
}
