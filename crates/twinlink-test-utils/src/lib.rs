// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Twinlink integration tests.
//!
//! Provides mock adapters and test harness infrastructure for fast,
//! deterministic, CI-runnable tests without external services.
//!
//! # Components
//!
//! - [`MockEmbedder`] - preset vectors per entity
//! - [`MockGenerator`] - queued turn replies with a fixed compatibility estimate
//! - [`TestHarness`] - the full service stack over a temp database

pub mod harness;
pub mod mock_embedder;
pub mod mock_generator;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_embedder::MockEmbedder;
pub use mock_generator::MockGenerator;
