// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable background jobs for Twinlink.
//!
//! Jobs are rows in the storage backend. [`JobQueue`] inserts them,
//! [`WorkerPool`] claims them under a lease and runs the registered
//! [`JobHandler`], and [`Sweeper`] enqueues the periodic maintenance kinds.
//! Transient failures are retried with exponential backoff until
//! `max_retries` is reached.

pub mod handler;
pub mod queue;
pub mod retry;
pub mod sweeper;
pub mod worker;

pub use handler::{JobContext, JobHandler};
pub use queue::JobQueue;
pub use retry::RetryPolicy;
pub use sweeper::Sweeper;
pub use worker::{JobOutcome, WorkerPool};
