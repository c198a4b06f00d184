// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence for Twinlink.
//!
//! WAL-mode SQLite with embedded migrations, a single-writer model via
//! `tokio-rusqlite`, and typed queries for profiles, embeddings, matches,
//! conversations, jobs, and notifications.

pub mod adapter;
pub mod database;
pub mod migrations;
pub mod queries;
mod rows;

pub use adapter::SqliteStorage;
pub use database::{Database, OpenOptions};

#[cfg(any(test, feature = "test-support"))]
pub mod testing;
