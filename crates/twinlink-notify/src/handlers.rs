// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use twinlink_core::TwinlinkError;
use twinlink_core::types::job_kinds;
use twinlink_scheduler::{JobContext, JobHandler};

use crate::gateway::NotificationGateway;

/// `notification.purge`: drops read notifications past retention.
pub struct PurgeNotificationsHandler {
    gateway: Arc<NotificationGateway>,
    retention_days: i64,
}

impl PurgeNotificationsHandler {
    pub fn new(gateway: Arc<NotificationGateway>, retention_days: i64) -> Self {
        Self {
            gateway,
            retention_days,
        }
    }
}

#[async_trait]
impl JobHandler for PurgeNotificationsHandler {
    fn kind(&self) -> &'static str {
        job_kinds::PURGE_NOTIFICATIONS
    }

    async fn run(&self, _ctx: &JobContext) -> Result<serde_json::Value, TwinlinkError> {
        let purged = self
            .gateway
            .purge_read_older_than(self.retention_days)
            .await?;
        Ok(json!({ "purged": purged }))
    }
}
