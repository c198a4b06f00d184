// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP/WebSocket transport for Twinlink.
//!
//! A thin axum layer over the match engine, the conversation orchestrator,
//! and the notification gateway. Handlers translate requests into domain
//! calls and map `TwinlinkError` onto status codes; no business rules live
//! here.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod server;
pub mod ws;

pub use auth::{AuthConfig, Caller, USER_HEADER};
pub use error::ApiError;
pub use server::{GatewayState, HealthState, router, start_server};
