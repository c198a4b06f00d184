// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Registry of live per-user delivery channels.
//!
//! A user may hold any number of channels (one per open socket). Fan-out is
//! non-blocking: a full buffer drops the frame for that channel, a closed
//! channel is pruned.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};
use twinlink_core::types::Notification;

/// A live channel handed to a transport.
#[derive(Debug)]
pub struct Subscription {
    pub id: u64,
    pub user_id: String,
    pub receiver: mpsc::Receiver<Notification>,
}

pub struct ChannelHub {
    channels: DashMap<String, Vec<(u64, mpsc::Sender<Notification>)>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl ChannelHub {
    pub fn new(buffer: usize) -> Self {
        Self {
            channels: DashMap::new(),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
        }
    }

    pub fn connect(&self, user_id: &str) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.buffer);
        self.channels
            .entry(user_id.to_string())
            .or_default()
            .push((id, tx));
        metrics::gauge!("twinlink_live_channels").increment(1.0);
        debug!(user_id, subscription = id, "live channel connected");
        Subscription {
            id,
            user_id: user_id.to_string(),
            receiver: rx,
        }
    }

    pub fn disconnect(&self, user_id: &str, subscription_id: u64) {
        let mut removed = false;
        if let Some(mut senders) = self.channels.get_mut(user_id) {
            let before = senders.len();
            senders.retain(|(id, _)| *id != subscription_id);
            removed = senders.len() < before;
        }
        self.channels.remove_if(user_id, |_, senders| senders.is_empty());
        if removed {
            metrics::gauge!("twinlink_live_channels").decrement(1.0);
            debug!(user_id, subscription = subscription_id, "live channel disconnected");
        }
    }

    /// Push to every live channel of the user. Returns the number of
    /// channels that accepted the frame.
    pub fn deliver(&self, notification: &Notification) -> usize {
        let user_id = notification.user_id.as_str();
        let mut delivered = 0;
        let mut pruned = 0;
        if let Some(mut senders) = self.channels.get_mut(user_id) {
            senders.retain(|(id, tx)| match tx.try_send(notification.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    warn!(user_id, subscription = id, "live channel full, frame dropped");
                    true
                }
                Err(TrySendError::Closed(_)) => {
                    pruned += 1;
                    false
                }
            });
        }
        if pruned > 0 {
            self.channels.remove_if(user_id, |_, senders| senders.is_empty());
            metrics::gauge!("twinlink_live_channels").decrement(pruned as f64);
            debug!(user_id, pruned, "closed live channels pruned");
        }
        delivered
    }

    pub fn connection_count(&self, user_id: &str) -> usize {
        self.channels.get(user_id).map_or(0, |senders| senders.len())
    }
}

impl Default for ChannelHub {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(user_id: &str, title: &str) -> Notification {
        Notification {
            id: format!("n-{title}"),
            user_id: user_id.into(),
            kind: "match_found".into(),
            title: title.into(),
            content: String::new(),
            data: serde_json::Value::Null,
            is_read: false,
            read_at: None,
            created_at: "2026-01-01T00:00:00.000Z".into(),
        }
    }

    #[tokio::test]
    async fn fans_out_to_every_channel_of_the_user() {
        let hub = ChannelHub::new(4);
        let mut a = hub.connect("u1");
        let mut b = hub.connect("u1");
        let mut other = hub.connect("u2");

        assert_eq!(hub.deliver(&notification("u1", "hello")), 2);
        assert_eq!(a.receiver.recv().await.unwrap().title, "hello");
        assert_eq!(b.receiver.recv().await.unwrap().title, "hello");
        assert!(other.receiver.try_recv().is_err());
    }

    #[test]
    fn closed_channels_are_pruned() {
        let hub = ChannelHub::new(4);
        let dropped = hub.connect("u1");
        let _kept = hub.connect("u1");
        drop(dropped);

        assert_eq!(hub.deliver(&notification("u1", "x")), 1);
        assert_eq!(hub.connection_count("u1"), 1);
    }

    #[test]
    fn full_buffer_drops_without_disconnecting() {
        let hub = ChannelHub::new(1);
        let _sub = hub.connect("u1");
        assert_eq!(hub.deliver(&notification("u1", "first")), 1);
        assert_eq!(hub.deliver(&notification("u1", "second")), 0);
        assert_eq!(hub.connection_count("u1"), 1);
    }

    #[test]
    fn disconnect_removes_only_that_subscription() {
        let hub = ChannelHub::new(4);
        let a = hub.connect("u1");
        let _b = hub.connect("u1");
        hub.disconnect("u1", a.id);
        assert_eq!(hub.connection_count("u1"), 1);
        hub.disconnect("u1", 999);
        assert_eq!(hub.connection_count("u1"), 1);
    }

    #[test]
    fn delivery_without_channels_is_a_no_op() {
        let hub = ChannelHub::default();
        assert_eq!(hub.deliver(&notification("nobody", "x")), 0);
    }
}
