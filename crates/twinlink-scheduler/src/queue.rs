// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Enqueue side of the job queue.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tracing::debug;
use twinlink_core::types::{BackgroundJob, JobStatus, format_timestamp, now_timestamp};
use twinlink_core::{StorageAdapter, TwinlinkError};

/// Handle for submitting and inspecting jobs. Cheap to clone.
#[derive(Clone)]
pub struct JobQueue {
    storage: Arc<dyn StorageAdapter>,
    wake: Arc<Notify>,
    max_retries: u32,
}

impl JobQueue {
    pub fn new(storage: Arc<dyn StorageAdapter>, max_retries: u32) -> Self {
        Self {
            storage,
            wake: Arc::new(Notify::new()),
            max_retries,
        }
    }

    /// Persist a job runnable now and wake an idle worker.
    pub async fn enqueue(
        &self,
        kind: &str,
        payload: serde_json::Value,
        owner_user_id: Option<&str>,
    ) -> Result<BackgroundJob, TwinlinkError> {
        self.enqueue_at(kind, payload, owner_user_id, Utc::now()).await
    }

    /// Persist a job that becomes runnable at `run_at`.
    pub async fn enqueue_at(
        &self,
        kind: &str,
        payload: serde_json::Value,
        owner_user_id: Option<&str>,
        run_at: DateTime<Utc>,
    ) -> Result<BackgroundJob, TwinlinkError> {
        let now = now_timestamp();
        let job = BackgroundJob {
            id: uuid::Uuid::new_v4().to_string(),
            kind: kind.to_string(),
            payload,
            owner_user_id: owner_user_id.map(str::to_string),
            status: JobStatus::Pending,
            progress: 0,
            retry_count: 0,
            max_retries: self.max_retries,
            result: None,
            error: None,
            next_run_at: format_timestamp(run_at),
            locked_until: None,
            started_at: None,
            completed_at: None,
            created_at: now.clone(),
            updated_at: now,
        };
        self.storage.insert_job(&job).await?;
        metrics::counter!("twinlink_jobs_enqueued_total", "kind" => job.kind.clone()).increment(1);
        debug!(job_id = %job.id, kind = %job.kind, "job enqueued");
        self.wake.notify_one();
        Ok(job)
    }

    pub async fn get(&self, job_id: &str) -> Result<Option<BackgroundJob>, TwinlinkError> {
        self.storage.get_job(job_id).await
    }

    pub async fn list(
        &self,
        owner_user_id: Option<&str>,
        status: Option<JobStatus>,
        limit: i64,
    ) -> Result<Vec<BackgroundJob>, TwinlinkError> {
        self.storage.list_jobs(owner_user_id, status, limit).await
    }

    pub(crate) fn storage(&self) -> &Arc<dyn StorageAdapter> {
        &self.storage
    }

    pub(crate) fn wake(&self) -> &Notify {
        &self.wake
    }
}
