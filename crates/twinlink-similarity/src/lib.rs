// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Agent embeddings and similarity search for Twinlink.
//!
//! An agent's persona is flattened to text ([`agent_profile_text`]), sent to
//! the configured [`EmbeddingAdapter`](twinlink_core::EmbeddingAdapter), and
//! stored as the agent's current vector. [`SqliteSimilarityIndex`] answers
//! nearest-neighbour queries over those vectors by cosine distance.

pub mod index;
pub mod service;
pub mod text;

pub use index::{SqliteSimilarityIndex, cosine_distance};
pub use service::{EmbedAgentHandler, EmbeddingService};
pub use text::agent_profile_text;
