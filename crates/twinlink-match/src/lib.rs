// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Match engine for Twinlink.
//!
//! Discovery turns nearest-neighbour distances between agent embeddings
//! into scored `pending` matches, at most one open match per user pair.
//! Both users must accept; a single rejection or the expiry sweep closes
//! the match. Conversations between the paired agents can refine the score
//! through [`OutcomeSink`](twinlink_core::OutcomeSink).

pub mod engine;
pub mod handlers;
pub mod score;

pub use engine::MatchEngine;
pub use handlers::{DiscoverHandler, DiscoverySweepHandler, ExpireHandler, ReasonHandler};
pub use score::{blend, score_from_distance};
