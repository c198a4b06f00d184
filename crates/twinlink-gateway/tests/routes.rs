// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Route-level tests driving the router with `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;
use twinlink_gateway::{AuthConfig, GatewayState, HealthState, router};
use twinlink_test_utils::TestHarness;

const TOKEN: &str = "test-token";

async fn setup() -> (TestHarness, Router) {
    let harness = TestHarness::builder().build().await.unwrap();
    harness
        .seed(&[
            ("u1", vec![1.0, 0.0]),
            ("u2", vec![0.96, 0.28]),
            ("u3", vec![0.0, 1.0]),
        ])
        .await
        .unwrap();
    harness.embed_all().await.unwrap();

    let state = GatewayState {
        matches: harness.matches.clone(),
        conversations: harness.conversations.clone(),
        notifications: harness.notifications.clone(),
        jobs: harness.queue.clone(),
        auth: AuthConfig {
            bearer_token: Some(TOKEN.to_string()),
        },
        health: HealthState {
            start_time: std::time::Instant::now(),
            adapters: harness.adapters.clone(),
            prometheus_render: Some(Arc::new(|| "twinlink_up 1\n".to_string())),
        },
    };
    (harness, router(state))
}

fn request(method: &str, uri: &str, user: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {TOKEN}"));
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

#[tokio::test]
async fn health_and_metrics_are_public() {
    let (_h, app) = setup().await;
    let health = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = call(&app, health).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    let names: Vec<&str> = body["adapters"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["sqlite", "mock-embedder", "mock-generator"]);
    assert_eq!(body["adapters"][0]["kind"], "Storage");

    let metrics = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let response = app.clone().oneshot(metrics).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unhealthy_adapter_fails_health() {
    let (h, app) = setup().await;
    h.embedder.set_failing(true);
    let health = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = call(&app, health).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["adapters"][1]["status"], "unhealthy");
    assert_eq!(body["adapters"][1]["detail"], "mock embedder failing");
    assert_eq!(body["adapters"][0]["status"], "ok");
}

#[tokio::test]
async fn api_requires_token_and_caller() {
    let (_h, app) = setup().await;
    let anonymous = Request::builder()
        .uri("/v1/matches")
        .header("x-user-id", "u1")
        .body(Body::empty())
        .unwrap();
    let (status, _) = call(&app, anonymous).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = call(&app, request("GET", "/v1/matches", None, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "bad_request");
}

#[tokio::test]
async fn discover_and_accept_flow() {
    let (h, app) = setup().await;
    let (status, body) = call(
        &app,
        request("POST", "/v1/matches/discover", Some("u1"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let matches = body.as_array().unwrap();
    assert_eq!(matches.len(), 1);
    let match_id = matches[0]["id"].as_str().unwrap().to_string();

    let (status, _) = call(
        &app,
        request("GET", &format!("/v1/matches/{match_id}"), Some("u3"), None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let respond = format!("/v1/matches/{match_id}/respond");
    let accept = Some(json!({ "decision": "accept" }));
    let (status, body) = call(&app, request("POST", &respond, Some("u1"), accept.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "pending");

    let (status, body) = call(&app, request("POST", &respond, Some("u1"), accept.clone())).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "already_responded");

    let (status, body) = call(&app, request("POST", &respond, Some("u2"), accept)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "accepted");

    let (_, body) = call(
        &app,
        request("GET", "/v1/matches?status=accepted", Some("u2"), None),
    )
    .await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (_, body) = call(
        &app,
        request("GET", "/v1/notifications/unread-count", Some("u2"), None),
    )
    .await;
    assert_eq!(body["unread_count"], 2);
    let (_, body) = call(
        &app,
        request("GET", "/v1/notifications?unread_only=true&limit=1", Some("u2"), None),
    )
    .await;
    let latest = &body.as_array().unwrap()[0];
    assert_eq!(latest["type"], "match_accepted");

    let read = format!("/v1/notifications/{}/read", latest["id"].as_str().unwrap());
    let (status, _) = call(&app, request("POST", &read, Some("u1"), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = call(&app, request("POST", &read, Some("u2"), None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, body) = call(
        &app,
        request("POST", "/v1/notifications/read-all", Some("u2"), None),
    )
    .await;
    assert_eq!(body["updated"], 1);

    drop(h);
}

#[tokio::test]
async fn user_conversation_flow() {
    let (_h, app) = setup().await;
    let start = json!({
        "kind": "user_to_user",
        "party_a": { "kind": "user", "id": "u1" },
        "party_b": { "kind": "user", "id": "u2" },
    });
    let (status, body) = call(
        &app,
        request("POST", "/v1/conversations", Some("u1"), Some(start)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["id"].as_str().unwrap().to_string();
    let messages = format!("/v1/conversations/{id}/messages");

    let (status, body) = call(
        &app,
        request("POST", &messages, Some("u2"), Some(json!({ "content": "hi" }))),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["sequence"], 1);

    let (status, _) = call(&app, request("GET", &messages, Some("u3"), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call(
        &app,
        request("GET", &format!("{messages}?after=0"), Some("u1"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = call(
        &app,
        request("POST", &format!("/v1/conversations/{id}/close"), Some("u1"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["end_reason"], "closed");

    let (status, body) = call(
        &app,
        request("POST", &messages, Some("u1"), Some(json!({ "content": "late" }))),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "conversation_not_active");

    let (status, body) = call(
        &app,
        request("POST", &format!("/v1/conversations/{id}/archive"), Some("u2"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "archived");
}

#[tokio::test]
async fn invalid_participants_are_unprocessable() {
    let (_h, app) = setup().await;
    let start = json!({
        "kind": "user_to_agent",
        "party_a": { "kind": "agent", "id": "agent-u1" },
        "party_b": { "kind": "user", "id": "u2" },
    });
    let (status, body) = call(
        &app,
        request("POST", "/v1/conversations", Some("u1"), Some(start)),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "invalid_participants");
}

#[tokio::test]
async fn jobs_are_visible_only_to_their_owner() {
    let (h, app) = setup().await;
    let job = h
        .queue
        .enqueue("match.discover", json!({ "user_id": "u1" }), Some("u1"))
        .await
        .unwrap();

    let (status, body) = call(
        &app,
        request("GET", &format!("/v1/jobs/{}", job.id), Some("u1"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "pending");
    let (status, _) = call(
        &app,
        request("GET", &format!("/v1/jobs/{}", job.id), Some("u2"), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
