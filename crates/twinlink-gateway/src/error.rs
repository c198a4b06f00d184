// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mapping of domain errors onto HTTP responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use twinlink_core::TwinlinkError;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "bad_request",
            message: message.into(),
        }
    }

    pub fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code: "unauthorized",
            message: "missing or invalid bearer token".to_string(),
        }
    }
}

impl From<TwinlinkError> for ApiError {
    fn from(err: TwinlinkError) -> Self {
        let (status, code) = match &err {
            TwinlinkError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            TwinlinkError::NotParticipant { .. } => (StatusCode::FORBIDDEN, "not_participant"),
            TwinlinkError::AlreadyResponded { .. } => (StatusCode::CONFLICT, "already_responded"),
            TwinlinkError::MatchNotPending { .. } => (StatusCode::CONFLICT, "match_not_pending"),
            TwinlinkError::ConversationNotActive { .. } => {
                (StatusCode::CONFLICT, "conversation_not_active")
            }
            TwinlinkError::InvalidTransition { .. } => (StatusCode::CONFLICT, "invalid_transition"),
            TwinlinkError::InvalidParticipants(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "invalid_participants")
            }
            TwinlinkError::Provider { .. } => (StatusCode::BAD_GATEWAY, "provider_error"),
            TwinlinkError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        }
        Self {
            status,
            code,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
                code: self.code,
            }),
        )
            .into_response()
    }
}
