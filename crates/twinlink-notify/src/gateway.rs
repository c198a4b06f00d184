// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable notifications with best-effort live delivery.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};
use twinlink_core::types::{Notification, Page, format_timestamp};
use twinlink_core::{StorageAdapter, TwinlinkError};

use crate::hub::{ChannelHub, Subscription};

pub struct NotificationGateway {
    storage: Arc<dyn StorageAdapter>,
    hub: Arc<ChannelHub>,
}

impl NotificationGateway {
    pub fn new(storage: Arc<dyn StorageAdapter>, hub: Arc<ChannelHub>) -> Self {
        Self { storage, hub }
    }

    pub fn hub(&self) -> &Arc<ChannelHub> {
        &self.hub
    }

    /// Persist an unread notification, then push it to the user's live
    /// channels. Only the persist step can fail.
    pub async fn publish(
        &self,
        user_id: &str,
        kind: &str,
        title: impl Into<String>,
        content: impl Into<String>,
        data: serde_json::Value,
    ) -> Result<Notification, TwinlinkError> {
        let notification = Notification {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            kind: kind.to_string(),
            title: title.into(),
            content: content.into(),
            data,
            is_read: false,
            read_at: None,
            created_at: format_timestamp(Utc::now()),
        };
        self.storage.insert_notification(&notification).await?;
        metrics::counter!("twinlink_notifications_total", "type" => kind.to_string()).increment(1);

        let delivered = self.hub.deliver(&notification);
        debug!(user_id, kind, delivered, "notification published");
        Ok(notification)
    }

    pub fn connect(&self, user_id: &str) -> Subscription {
        self.hub.connect(user_id)
    }

    pub fn disconnect(&self, user_id: &str, subscription_id: u64) {
        self.hub.disconnect(user_id, subscription_id);
    }

    pub async fn list(
        &self,
        user_id: &str,
        unread_only: bool,
        page: Page,
    ) -> Result<Vec<Notification>, TwinlinkError> {
        self.storage
            .list_notifications(user_id, unread_only, page)
            .await
    }

    pub async fn unread_count(&self, user_id: &str) -> Result<i64, TwinlinkError> {
        self.storage.unread_notification_count(user_id).await
    }

    pub async fn mark_read(
        &self,
        user_id: &str,
        notification_id: &str,
    ) -> Result<(), TwinlinkError> {
        let found = self
            .storage
            .mark_notification_read(user_id, notification_id, &format_timestamp(Utc::now()))
            .await?;
        if found {
            Ok(())
        } else {
            Err(TwinlinkError::NotFound {
                entity: "notification",
                id: notification_id.to_string(),
            })
        }
    }

    pub async fn mark_all_read(&self, user_id: &str) -> Result<usize, TwinlinkError> {
        self.storage
            .mark_all_notifications_read(user_id, &format_timestamp(Utc::now()))
            .await
    }

    /// Delete read notifications older than `days`. Unread ones are kept.
    pub async fn purge_read_older_than(&self, days: i64) -> Result<usize, TwinlinkError> {
        let cutoff = Utc::now()
            .checked_sub_signed(chrono::Duration::days(days.max(0)))
            .ok_or_else(|| {
                TwinlinkError::Internal(format!("retention of {days} days out of range"))
            })?;
        let purged = self
            .storage
            .purge_read_notifications(&format_timestamp(cutoff))
            .await?;
        if purged > 0 {
            info!(purged, days, "read notifications purged");
        }
        Ok(purged)
    }
}
