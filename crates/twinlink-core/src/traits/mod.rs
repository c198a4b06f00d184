// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait seams between Twinlink components and their backends.
//!
//! Adapters extend [`PluginAdapter`] and use `#[async_trait]` for dynamic
//! dispatch compatibility.

pub mod adapter;
pub mod embedding;
pub mod events;
pub mod generation;
pub mod profile;
pub mod similarity;
pub mod storage;

pub use adapter::PluginAdapter;
pub use embedding::{EmbeddingAdapter, EmbeddingRequest};
pub use events::{ConversationOutcome, DomainEvent, EventSink, OutcomeSink};
pub use generation::{GeneratedTurn, GenerationAdapter, ReasonRequest, TurnRequest};
pub use profile::ProfileStore;
pub use similarity::{Neighbor, SimilarityIndex};
pub use storage::StorageAdapter;
