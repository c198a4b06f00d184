// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation orchestration for Twinlink.
//!
//! Conversations run between two parties in fixed slots. Agent turns are
//! produced by background jobs: every appended text message schedules the
//! counterpart agent's reply, so an agent-to-agent conversation advances
//! one job at a time until it concludes, hits its turn limit, or goes idle.

pub mod handlers;
pub mod orchestrator;
pub mod turns;

pub use handlers::{InactivitySweepHandler, StartConversationHandler, TurnHandler};
pub use orchestrator::ConversationOrchestrator;
pub use turns::{COMPATIBILITY_KEY, compatibility_metadata, mean_compatibility, strip_marker};
