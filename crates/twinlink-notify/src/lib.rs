// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! User notifications for Twinlink.
//!
//! Every notification is persisted before it is pushed, so the unread
//! listing is the source of truth. Live channels receive whatever was
//! published while they were connected; there is no replay on reconnect.

pub mod events;
pub mod gateway;
pub mod handlers;
pub mod hub;

pub use events::NotifyingSink;
pub use gateway::NotificationGateway;
pub use handlers::PurgeNotificationsHandler;
pub use hub::{ChannelHub, Subscription};
