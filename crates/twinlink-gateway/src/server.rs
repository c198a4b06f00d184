// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use tokio_util::sync::CancellationToken;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use twinlink_config::model::GatewayConfig;
use twinlink_conversation::ConversationOrchestrator;
use twinlink_core::{PluginAdapter, TwinlinkError};
use twinlink_match::MatchEngine;
use twinlink_notify::NotificationGateway;
use twinlink_scheduler::JobQueue;

use crate::auth::{AuthConfig, auth_middleware};
use crate::handlers;
use crate::ws;

/// In-flight API requests before callers queue.
const MAX_CONCURRENT_REQUESTS: usize = 512;

/// State for the unauthenticated health and metrics endpoints.
#[derive(Clone)]
pub struct HealthState {
    pub start_time: std::time::Instant,
    /// Adapters whose health checks make up `GET /health`.
    pub adapters: Vec<Arc<dyn PluginAdapter>>,
    /// Renders the Prometheus exposition, when metrics are enabled.
    pub prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>>,
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub matches: Arc<MatchEngine>,
    pub conversations: Arc<ConversationOrchestrator>,
    pub notifications: Arc<NotificationGateway>,
    pub jobs: JobQueue,
    pub auth: AuthConfig,
    pub health: HealthState,
}

/// Build the full route table.
///
/// - `GET /health`, `GET /metrics`: public
/// - `/v1/...`: bearer token plus `X-User-Id`
/// - `GET /ws`: token checked during the handshake
pub fn router(state: GatewayState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::get_public_health))
        .route("/metrics", get(handlers::get_public_metrics))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/v1/matches/discover", post(handlers::post_discover))
        .route("/v1/matches", get(handlers::get_matches))
        .route("/v1/matches/{id}", get(handlers::get_match))
        .route("/v1/matches/{id}/respond", post(handlers::post_respond))
        .route(
            "/v1/conversations",
            get(handlers::get_conversations).post(handlers::post_conversation),
        )
        .route("/v1/conversations/{id}", get(handlers::get_conversation))
        .route(
            "/v1/conversations/{id}/messages",
            get(handlers::get_messages).post(handlers::post_message),
        )
        .route("/v1/conversations/{id}/close", post(handlers::post_close))
        .route("/v1/conversations/{id}/archive", post(handlers::post_archive))
        .route("/v1/conversations/{id}/unarchive", post(handlers::post_unarchive))
        .route("/v1/notifications", get(handlers::get_notifications))
        .route(
            "/v1/notifications/unread-count",
            get(handlers::get_unread_count),
        )
        .route("/v1/notifications/read-all", post(handlers::post_read_all))
        .route("/v1/notifications/{id}/read", post(handlers::post_read))
        .route("/v1/jobs/{id}", get(handlers::get_job))
        .route_layer(axum_middleware::from_fn_with_state(
            state.auth.clone(),
            auth_middleware,
        ))
        .with_state(state.clone());

    let ws_routes = Router::new()
        .route("/ws", get(ws::ws_handler))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .merge(ws_routes)
        .layer(ConcurrencyLimitLayer::new(MAX_CONCURRENT_REQUESTS))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve until `cancel` fires.
pub async fn start_server(
    config: &GatewayConfig,
    state: GatewayState,
    cancel: CancellationToken,
) -> Result<(), TwinlinkError> {
    let app = router(state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| TwinlinkError::Channel {
            message: format!("failed to bind gateway to {addr}: {e}"),
            source: Some(Box::new(e)),
        })?;

    tracing::info!("Gateway server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| TwinlinkError::Channel {
            message: format!("gateway server error: {e}"),
            source: Some(Box::new(e)),
        })?;

    tracing::info!("Gateway server stopped");
    Ok(())
}
