// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the gateway REST API.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use twinlink_core::TwinlinkError;
use twinlink_core::types::{
    BackgroundJob, Conversation, ConversationKind, Decision, HealthStatus, Match, MatchStatus,
    Message, MessageKind, NewMessage, Notification, Page, Party,
};

use crate::auth::Caller;
use crate::error::ApiError;
use crate::server::GatewayState;

/// Largest page a client may request.
const MAX_PAGE: i64 = 200;

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub offset: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
}

impl PageQuery {
    fn page(&self) -> Page {
        page_of(self.offset, self.limit)
    }
}

fn page_of(offset: Option<i64>, limit: Option<i64>) -> Page {
    let default = Page::default();
    Page {
        offset: offset.unwrap_or(default.offset).max(0),
        limit: limit.unwrap_or(default.limit).clamp(1, MAX_PAGE),
    }
}

#[derive(Debug, Deserialize)]
pub struct MatchListQuery {
    #[serde(default)]
    pub status: Option<MatchStatus>,
    #[serde(default)]
    pub offset: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    pub decision: Decision,
}

#[derive(Debug, Deserialize)]
pub struct StartConversationRequest {
    pub kind: ConversationKind,
    pub party_a: Party,
    pub party_b: Party,
}

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default)]
    pub after: i64,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    pub content: String,
    #[serde(default)]
    pub replaces_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
    #[serde(default)]
    pub offset: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub adapters: Vec<AdapterHealth>,
}

#[derive(Debug, Serialize)]
pub struct AdapterHealth {
    pub name: String,
    pub kind: String,
    pub version: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// GET /health
///
/// 200 while every adapter is healthy or degraded, 503 once one is
/// unhealthy or its check fails.
pub async fn get_public_health(State(state): State<GatewayState>) -> Response {
    let checks = state
        .health
        .adapters
        .iter()
        .map(|adapter| async move { (adapter, adapter.health_check().await) });
    let mut adapters = Vec::with_capacity(state.health.adapters.len());
    let (mut degraded, mut unhealthy) = (false, false);
    for (adapter, result) in futures::future::join_all(checks).await {
        let (status, detail) = match result {
            Ok(HealthStatus::Healthy) => ("ok", None),
            Ok(HealthStatus::Degraded(reason)) => {
                degraded = true;
                ("degraded", Some(reason))
            }
            Ok(HealthStatus::Unhealthy(reason)) => {
                unhealthy = true;
                ("unhealthy", Some(reason))
            }
            Err(e) => {
                unhealthy = true;
                ("unhealthy", Some(e.to_string()))
            }
        };
        if let Some(reason) = &detail {
            tracing::warn!(
                adapter = adapter.name(),
                status,
                reason = %reason,
                "adapter not healthy"
            );
        }
        adapters.push(AdapterHealth {
            name: adapter.name().to_string(),
            kind: adapter.adapter_type().to_string(),
            version: adapter.version().to_string(),
            status: status.to_string(),
            detail,
        });
    }

    let (code, status) = if unhealthy {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    } else if degraded {
        (StatusCode::OK, "degraded")
    } else {
        (StatusCode::OK, "ok")
    };
    let body = HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.health.start_time.elapsed().as_secs(),
        adapters,
    };
    (code, Json(body)).into_response()
}

/// GET /metrics
pub async fn get_public_metrics(State(state): State<GatewayState>) -> Response {
    match &state.health.prometheus_render {
        Some(render) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}

/// POST /v1/matches/discover
pub async fn post_discover(
    State(state): State<GatewayState>,
    Caller(user_id): Caller,
) -> ApiResult<Json<Vec<Match>>> {
    Ok(Json(state.matches.discover(&user_id).await?))
}

/// GET /v1/matches
pub async fn get_matches(
    State(state): State<GatewayState>,
    Caller(user_id): Caller,
    Query(query): Query<MatchListQuery>,
) -> ApiResult<Json<Vec<Match>>> {
    let matches = state
        .matches
        .list(&user_id, query.status, page_of(query.offset, query.limit))
        .await?;
    Ok(Json(matches))
}

/// GET /v1/matches/{id}
pub async fn get_match(
    State(state): State<GatewayState>,
    Caller(user_id): Caller,
    Path(match_id): Path<String>,
) -> ApiResult<Json<Match>> {
    Ok(Json(state.matches.get(&match_id, &user_id).await?))
}

/// POST /v1/matches/{id}/respond
pub async fn post_respond(
    State(state): State<GatewayState>,
    Caller(user_id): Caller,
    Path(match_id): Path<String>,
    Json(body): Json<RespondRequest>,
) -> ApiResult<Json<Match>> {
    Ok(Json(
        state
            .matches
            .respond(&match_id, &user_id, body.decision)
            .await?,
    ))
}

/// POST /v1/conversations
pub async fn post_conversation(
    State(state): State<GatewayState>,
    Caller(user_id): Caller,
    Json(body): Json<StartConversationRequest>,
) -> ApiResult<(StatusCode, Json<Conversation>)> {
    let conversation = state
        .conversations
        .start_as(&user_id, body.kind, body.party_a, body.party_b)
        .await?;
    Ok((StatusCode::CREATED, Json(conversation)))
}

/// GET /v1/conversations
pub async fn get_conversations(
    State(state): State<GatewayState>,
    Caller(user_id): Caller,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Vec<Conversation>>> {
    Ok(Json(
        state
            .conversations
            .list_for_user(&user_id, query.page())
            .await?,
    ))
}

/// GET /v1/conversations/{id}
pub async fn get_conversation(
    State(state): State<GatewayState>,
    Caller(user_id): Caller,
    Path(conversation_id): Path<String>,
) -> ApiResult<Json<Conversation>> {
    Ok(Json(
        state.conversations.get(&conversation_id, &user_id).await?,
    ))
}

/// GET /v1/conversations/{id}/messages
pub async fn get_messages(
    State(state): State<GatewayState>,
    Caller(user_id): Caller,
    Path(conversation_id): Path<String>,
    Query(query): Query<MessageQuery>,
) -> ApiResult<Json<Vec<Message>>> {
    let limit = page_of(None, query.limit).limit;
    let messages = state
        .conversations
        .messages(&conversation_id, &user_id, query.after.max(0), limit)
        .await?;
    Ok(Json(messages))
}

/// POST /v1/conversations/{id}/messages
///
/// The caller speaks in their own user slot.
pub async fn post_message(
    State(state): State<GatewayState>,
    Caller(user_id): Caller,
    Path(conversation_id): Path<String>,
    Json(body): Json<PostMessageRequest>,
) -> ApiResult<(StatusCode, Json<Message>)> {
    if body.content.trim().is_empty() {
        return Err(ApiError::bad_request("message content is empty"));
    }
    state.conversations.get(&conversation_id, &user_id).await?;
    let appended = state
        .conversations
        .append_turn(
            &conversation_id,
            NewMessage {
                sender: Party::User(user_id),
                kind: MessageKind::Text,
                content: body.content,
                metadata: None,
                concludes: false,
                replaces_id: body.replaces_id,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(appended.message)))
}

/// POST /v1/conversations/{id}/close
pub async fn post_close(
    State(state): State<GatewayState>,
    Caller(user_id): Caller,
    Path(conversation_id): Path<String>,
) -> ApiResult<Json<Conversation>> {
    Ok(Json(
        state.conversations.close(&conversation_id, &user_id).await?,
    ))
}

/// POST /v1/conversations/{id}/archive
pub async fn post_archive(
    State(state): State<GatewayState>,
    Caller(user_id): Caller,
    Path(conversation_id): Path<String>,
) -> ApiResult<Json<Conversation>> {
    Ok(Json(
        state
            .conversations
            .archive(&conversation_id, &user_id)
            .await?,
    ))
}

/// POST /v1/conversations/{id}/unarchive
pub async fn post_unarchive(
    State(state): State<GatewayState>,
    Caller(user_id): Caller,
    Path(conversation_id): Path<String>,
) -> ApiResult<Json<Conversation>> {
    Ok(Json(
        state
            .conversations
            .unarchive(&conversation_id, &user_id)
            .await?,
    ))
}

/// GET /v1/notifications
pub async fn get_notifications(
    State(state): State<GatewayState>,
    Caller(user_id): Caller,
    Query(query): Query<NotificationQuery>,
) -> ApiResult<Json<Vec<Notification>>> {
    let notifications = state
        .notifications
        .list(&user_id, query.unread_only, page_of(query.offset, query.limit))
        .await?;
    Ok(Json(notifications))
}

/// GET /v1/notifications/unread-count
pub async fn get_unread_count(
    State(state): State<GatewayState>,
    Caller(user_id): Caller,
) -> ApiResult<Json<serde_json::Value>> {
    let count = state.notifications.unread_count(&user_id).await?;
    Ok(Json(json!({ "unread_count": count })))
}

/// POST /v1/notifications/{id}/read
pub async fn post_read(
    State(state): State<GatewayState>,
    Caller(user_id): Caller,
    Path(notification_id): Path<String>,
) -> ApiResult<StatusCode> {
    state
        .notifications
        .mark_read(&user_id, &notification_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/notifications/read-all
pub async fn post_read_all(
    State(state): State<GatewayState>,
    Caller(user_id): Caller,
) -> ApiResult<Json<serde_json::Value>> {
    let updated = state.notifications.mark_all_read(&user_id).await?;
    Ok(Json(json!({ "updated": updated })))
}

/// GET /v1/jobs/{id}
///
/// Only the job's owner can see it.
pub async fn get_job(
    State(state): State<GatewayState>,
    Caller(user_id): Caller,
    Path(job_id): Path<String>,
) -> ApiResult<Json<BackgroundJob>> {
    match state.jobs.get(&job_id).await? {
        Some(job) if job.owner_user_id.as_deref() == Some(user_id.as_str()) => Ok(Json(job)),
        _ => Err(TwinlinkError::NotFound {
            entity: "job",
            id: job_id,
        }
        .into()),
    }
}
