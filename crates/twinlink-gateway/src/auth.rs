// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Authentication and caller identity.
//!
//! API routes require `Authorization: Bearer <token>`. The acting user is
//! taken from `X-User-Id`. With no token configured every request is
//! rejected (fail-closed).

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{StatusCode, request::Parts},
    middleware::Next,
    response::Response,
};

use crate::error::ApiError;

/// Header naming the acting user.
pub const USER_HEADER: &str = "x-user-id";

#[derive(Clone)]
pub struct AuthConfig {
    pub bearer_token: Option<String>,
}

impl AuthConfig {
    /// True if `candidate` equals the configured token.
    pub fn accepts(&self, candidate: Option<&str>) -> bool {
        match (&self.bearer_token, candidate) {
            (Some(expected), Some(token)) => expected == token,
            _ => false,
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field(
                "bearer_token",
                &self.bearer_token.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}

pub async fn auth_middleware(
    State(auth): State<AuthConfig>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if auth.bearer_token.is_none() {
        tracing::error!("gateway has no bearer token configured -- rejecting request");
        return Err(StatusCode::UNAUTHORIZED);
    }
    let token = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if auth.accepts(token) {
        Ok(next.run(request).await)
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

/// The user on whose behalf a request acts.
#[derive(Debug, Clone)]
pub struct Caller(pub String);

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| Caller(v.to_string()))
            .ok_or_else(|| ApiError::bad_request(format!("missing {USER_HEADER} header")))
    }
}
