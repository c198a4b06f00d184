// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The job handler seam.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use twinlink_core::types::BackgroundJob;
use twinlink_core::{StorageAdapter, TwinlinkError};

/// What a handler sees of the job it runs.
pub struct JobContext {
    job: BackgroundJob,
    storage: Arc<dyn StorageAdapter>,
}

impl JobContext {
    pub fn new(job: BackgroundJob, storage: Arc<dyn StorageAdapter>) -> Self {
        Self { job, storage }
    }

    pub fn job(&self) -> &BackgroundJob {
        &self.job
    }

    /// 1-based attempt number.
    pub fn attempt(&self) -> u32 {
        self.job.retry_count + 1
    }

    /// Decode the payload. A payload that does not decode is a permanent
    /// failure.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, TwinlinkError> {
        serde_json::from_value(self.job.payload.clone()).map_err(|e| {
            TwinlinkError::Corrupt(format!("invalid {} payload: {e}", self.job.kind))
        })
    }

    /// Report progress in percent.
    pub async fn set_progress(&self, progress: u8) -> Result<(), TwinlinkError> {
        self.storage.update_job_progress(&self.job.id, progress).await
    }
}

/// Runs jobs of one kind.
///
/// Transient errors are retried with backoff; any other error fails the job
/// at once.
#[async_trait]
pub trait JobHandler: Send + Sync {
    fn kind(&self) -> &'static str;

    /// Run one attempt. The returned value is stored as the job result.
    async fn run(&self, ctx: &JobContext) -> Result<serde_json::Value, TwinlinkError>;

    /// Called once after the job failed for good.
    async fn on_exhausted(&self, _job: &BackgroundJob, _error: &str) -> Result<(), TwinlinkError> {
        Ok(())
    }
}
