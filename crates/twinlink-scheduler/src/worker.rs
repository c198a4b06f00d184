// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Worker pool: claims jobs, runs their handlers, records outcomes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use twinlink_config::model::SchedulerConfig;
use twinlink_core::types::{BackgroundJob, format_timestamp};
use twinlink_core::{DomainEvent, EventSink, StorageAdapter, TwinlinkError};

use crate::handler::{JobContext, JobHandler};
use crate::queue::JobQueue;
use crate::retry::RetryPolicy;

/// What happened to a claimed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Retrying { retry_at: String },
    Failed { error: String },
}

/// A bounded set of workers sharing one queue and handler registry.
pub struct WorkerPool {
    queue: JobQueue,
    handlers: HashMap<&'static str, Arc<dyn JobHandler>>,
    events: Option<Arc<dyn EventSink>>,
    retry: RetryPolicy,
    workers: usize,
    attempt_timeout: Duration,
    lease: Duration,
    poll_interval: Duration,
}

impl WorkerPool {
    pub fn new(queue: JobQueue, config: &SchedulerConfig) -> Self {
        let attempt_timeout = Duration::from_secs(config.attempt_timeout_secs);
        Self {
            queue,
            handlers: HashMap::new(),
            events: None,
            retry: RetryPolicy::from_config(config),
            workers: config.workers.max(1),
            attempt_timeout,
            lease: attempt_timeout + Duration::from_secs(config.lease_grace_secs),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        }
    }

    /// Register the handler for its kind, replacing any earlier one.
    pub fn register(&mut self, handler: Arc<dyn JobHandler>) {
        debug!(kind = handler.kind(), "job handler registered");
        self.handlers.insert(handler.kind(), handler);
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    fn storage(&self) -> &Arc<dyn StorageAdapter> {
        self.queue.storage()
    }

    /// Claim and execute at most one job. Returns `None` when nothing is
    /// runnable.
    ///
    /// A run whose lease lapsed with no retries left is failed first, with
    /// its handler's exhaustion hook.
    pub async fn run_once(&self) -> Result<Option<(BackgroundJob, JobOutcome)>, TwinlinkError> {
        let now = format_timestamp(Utc::now());
        let lease_until = format_timestamp(add_duration(Utc::now(), self.lease));
        if let Some(job) = self.storage().claim_expired_job(&now, &lease_until).await? {
            let handler = self.handlers.get(job.kind.as_str()).cloned();
            warn!(job_id = %job.id, kind = %job.kind, "job lease expired with no retries left");
            let outcome = self
                .fail_permanently(&job, handler, "lease expired".to_string())
                .await?;
            return Ok(Some((job, outcome)));
        }
        let Some(job) = self.storage().claim_next_job(&now, &lease_until).await? else {
            return Ok(None);
        };
        let outcome = self.execute(&job).await?;
        Ok(Some((job, outcome)))
    }

    /// Run jobs until none is runnable. Returns how many were executed.
    pub async fn drain(&self) -> Result<usize, TwinlinkError> {
        let mut executed = 0;
        while self.run_once().await?.is_some() {
            executed += 1;
        }
        Ok(executed)
    }

    async fn execute(&self, job: &BackgroundJob) -> Result<JobOutcome, TwinlinkError> {
        let kind = job.kind.clone();
        let Some(handler) = self.handlers.get(job.kind.as_str()).cloned() else {
            warn!(job_id = %job.id, kind = %kind, "no handler registered for job kind");
            let error = format!("no handler registered for job kind '{kind}'");
            return self.fail_permanently(job, None, error).await;
        };

        debug!(job_id = %job.id, kind = %kind, attempt = job.retry_count + 1, "running job");
        let ctx = JobContext::new(job.clone(), Arc::clone(self.storage()));
        let started = Instant::now();
        let result = match tokio::time::timeout(self.attempt_timeout, handler.run(&ctx)).await {
            Ok(result) => result,
            Err(_) => Err(TwinlinkError::Timeout {
                duration: self.attempt_timeout,
            }),
        };
        metrics::histogram!("twinlink_job_duration_seconds", "kind" => kind.clone())
            .record(started.elapsed().as_secs_f64());

        match result {
            Ok(value) => {
                self.storage()
                    .complete_job(&job.id, &value, &format_timestamp(Utc::now()))
                    .await?;
                metrics::counter!("twinlink_jobs_completed_total", "kind" => kind).increment(1);
                debug!(job_id = %job.id, "job completed");
                Ok(JobOutcome::Completed)
            }
            Err(e) if e.is_transient() && !job.retries_exhausted() => {
                let now = Utc::now();
                let retry_at =
                    format_timestamp(add_duration(now, self.retry.delay(job.retry_count)));
                self.storage()
                    .fail_job(&job.id, &e.to_string(), Some(&retry_at), &format_timestamp(now))
                    .await?;
                metrics::counter!("twinlink_jobs_retried_total", "kind" => kind).increment(1);
                warn!(
                    job_id = %job.id,
                    retry_count = job.retry_count + 1,
                    retry_at = %retry_at,
                    error = %e,
                    "job attempt failed, retrying"
                );
                // Wake a sleeping worker in case the retry is due immediately.
                self.queue.wake().notify_one();
                Ok(JobOutcome::Retrying { retry_at })
            }
            Err(e) => self.fail_permanently(job, Some(handler), e.to_string()).await,
        }
    }

    async fn fail_permanently(
        &self,
        job: &BackgroundJob,
        handler: Option<Arc<dyn JobHandler>>,
        error: String,
    ) -> Result<JobOutcome, TwinlinkError> {
        let failed = self
            .storage()
            .fail_job(&job.id, &error, None, &format_timestamp(Utc::now()))
            .await?;
        metrics::counter!("twinlink_jobs_failed_total", "kind" => job.kind.clone()).increment(1);
        error!(
            job_id = %job.id,
            kind = %job.kind,
            retry_count = failed.retry_count,
            error = %error,
            "job failed"
        );

        if let Some(handler) = handler {
            if let Err(e) = handler.on_exhausted(&failed, &error).await {
                error!(job_id = %job.id, error = %e, "exhaustion hook failed");
            }
        }
        if let (Some(_), Some(events)) = (&failed.owner_user_id, &self.events) {
            if let Err(e) = events.emit(DomainEvent::JobFailed(failed.clone())).await {
                warn!(job_id = %job.id, error = %e, "failed to emit job failure event");
            }
        }
        Ok(JobOutcome::Failed { error })
    }

    /// Start the worker tasks. Each worker finishes its current job before
    /// observing cancellation.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        info!(workers = self.workers, "starting job workers");
        (0..self.workers)
            .map(|worker| {
                let pool = Arc::clone(&self);
                let cancel = cancel.clone();
                tokio::spawn(async move { pool.worker_loop(worker, cancel).await })
            })
            .collect()
    }

    async fn worker_loop(&self, worker: usize, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                break;
            }
            match self.run_once().await {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(e) => error!(worker, error = %e, "worker failed to process job"),
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.queue.wake().notified() => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
        debug!(worker, "job worker stopped");
    }
}

fn add_duration(at: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|d| at.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
