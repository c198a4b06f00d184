// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `twinlink serve`, `twinlink migrate` and `twinlink sweep`.
//!
//! `serve` starts the job workers, the periodic sweep schedules and, when
//! enabled, the HTTP/WebSocket gateway. Everything shares one
//! cancellation token driven by SIGINT/SIGTERM; on shutdown the workers
//! finish their current job and the database is checkpointed and closed.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use twinlink_config::TwinlinkConfig;
use twinlink_core::{PluginAdapter, StorageAdapter, TwinlinkError};

use crate::services::{Services, open_storage};
use crate::shutdown;

/// Runs the `twinlink serve` command.
pub async fn run_serve(config: TwinlinkConfig) -> Result<(), TwinlinkError> {
    info!(service = %config.service.name, "starting twinlink serve");

    let services = Services::build(&config).await.inspect_err(|e| {
        error!(error = %e, "failed to initialize services");
    })?;

    #[cfg(feature = "prometheus")]
    let prometheus_adapter = if config.prometheus.enabled {
        match twinlink_prometheus::PrometheusAdapter::new() {
            Ok(adapter) => {
                info!("prometheus metrics enabled");
                Some(adapter)
            }
            Err(e) => {
                warn!(error = %e, "prometheus initialization failed, continuing without metrics");
                None
            }
        }
    } else {
        debug!("prometheus metrics disabled by configuration");
        None
    };

    #[cfg(feature = "prometheus")]
    let prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>> =
        prometheus_adapter.as_ref().map(|adapter| {
            let handle = adapter.handle().clone();
            Arc::new(move || handle.render()) as Arc<dyn Fn() -> String + Send + Sync>
        });
    #[cfg(not(feature = "prometheus"))]
    let prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>> = None;

    #[cfg(feature = "prometheus")]
    let observability =
        prometheus_adapter.map(|adapter| Arc::new(adapter) as Arc<dyn PluginAdapter>);
    #[cfg(not(feature = "prometheus"))]
    let observability: Option<Arc<dyn PluginAdapter>> = None;
    let health_adapters: Vec<Arc<dyn PluginAdapter>> = services
        .adapters
        .iter()
        .cloned()
        .chain(observability)
        .collect();

    let cancel = shutdown::install_signal_handler();

    let mut tasks = services.workers.clone().spawn(cancel.clone());
    tasks.extend(services.sweeper(&config).spawn(cancel.clone()));

    run_gateway(
        &config,
        &services,
        health_adapters,
        prometheus_render,
        cancel.clone(),
    )
    .await?;

    // Without a gateway there is nothing in the foreground to wait on.
    cancel.cancelled().await;

    info!(tasks = tasks.len(), "waiting for background tasks to stop");
    for task in tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "background task ended abnormally");
        }
    }

    services.shutdown().await;
    services.storage.close().await?;
    info!("twinlink serve shutdown complete");
    Ok(())
}

#[cfg(feature = "gateway")]
async fn run_gateway(
    config: &TwinlinkConfig,
    services: &Services,
    adapters: Vec<Arc<dyn PluginAdapter>>,
    prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>>,
    cancel: CancellationToken,
) -> Result<(), TwinlinkError> {
    use twinlink_gateway::{AuthConfig, GatewayState, HealthState};

    if !config.gateway.enabled {
        debug!("gateway disabled by configuration");
        return Ok(());
    }
    if config.gateway.bearer_token.is_none() {
        warn!("gateway enabled without gateway.bearer_token, every /v1 request will be rejected");
    }

    let state = GatewayState {
        matches: services.matches.clone(),
        conversations: services.conversations.clone(),
        notifications: services.notifications.clone(),
        jobs: services.queue.clone(),
        auth: AuthConfig {
            bearer_token: config.gateway.bearer_token.clone(),
        },
        health: HealthState {
            start_time: std::time::Instant::now(),
            adapters,
            prometheus_render,
        },
    };
    info!(
        host = config.gateway.host.as_str(),
        port = config.gateway.port,
        "starting gateway"
    );
    let result = twinlink_gateway::start_server(&config.gateway, state, cancel.clone()).await;
    if result.is_err() {
        cancel.cancel();
    }
    result
}

#[cfg(not(feature = "gateway"))]
async fn run_gateway(
    _config: &TwinlinkConfig,
    _services: &Services,
    _adapters: Vec<Arc<dyn PluginAdapter>>,
    _prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>>,
    _cancel: CancellationToken,
) -> Result<(), TwinlinkError> {
    debug!("gateway not compiled in");
    Ok(())
}

/// Runs the `twinlink migrate` command.
pub async fn run_migrate(config: TwinlinkConfig) -> Result<(), TwinlinkError> {
    let storage = open_storage(&config).await?;
    storage.close().await?;
    info!(path = %config.storage.database_path, "migrations applied");
    Ok(())
}

/// Runs the `twinlink sweep` command: one pass of every periodic job,
/// including the follow-up work it enqueues.
pub async fn run_sweep(config: TwinlinkConfig) -> Result<(), TwinlinkError> {
    let services = Services::build(&config).await?;
    let scheduled = services.sweeper(&config).run_all_once().await?;
    let executed = services.workers.drain().await?;
    info!(scheduled, executed, "sweep complete");
    services.shutdown().await;
    services.storage.close().await?;
    Ok(())
}

/// Initializes the tracing subscriber with the given log level.
pub fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("twinlink={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
