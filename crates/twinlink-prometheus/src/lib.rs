// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prometheus metrics exporter for Twinlink.
//!
//! Uses the metrics-rs facade with the Prometheus exporter.
//! Metrics are rendered as Prometheus text format via the `render()` method,
//! which is exposed through the gateway's /metrics endpoint.

pub mod recording;

use async_trait::async_trait;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use twinlink_core::types::{AdapterType, HealthStatus};
use twinlink_core::{PluginAdapter, TwinlinkError};

pub use recording::{register_metrics, set_build_info};

/// Installs the Prometheus recorder and exposes a handle for rendering.
pub struct PrometheusAdapter {
    handle: PrometheusHandle,
}

impl PrometheusAdapter {
    /// Installs the recorder globally. Only one recorder can be installed
    /// per process; a second call returns an error.
    pub fn new() -> Result<Self, TwinlinkError> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            TwinlinkError::Internal(format!("failed to install Prometheus recorder: {e}"))
        })?;

        recording::register_metrics();
        recording::set_build_info(env!("CARGO_PKG_VERSION"));

        tracing::info!("prometheus metrics recorder installed");

        Ok(Self { handle })
    }

    pub fn handle(&self) -> &PrometheusHandle {
        &self.handle
    }

    /// Render all collected metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

#[async_trait]
impl PluginAdapter for PrometheusAdapter {
    fn name(&self) -> &str {
        "prometheus"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Observability
    }

    async fn health_check(&self) -> Result<HealthStatus, TwinlinkError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), TwinlinkError> {
        Ok(())
    }
}
