// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Periodic job enqueueing.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::queue::JobQueue;

/// Enqueues fixed job kinds on fixed intervals.
pub struct Sweeper {
    queue: JobQueue,
    schedules: Vec<(&'static str, Duration)>,
}

impl Sweeper {
    pub fn new(queue: JobQueue) -> Self {
        Self {
            queue,
            schedules: Vec::new(),
        }
    }

    /// Enqueue `kind` with an empty payload every `interval`. A zero
    /// interval disables the schedule.
    pub fn every(mut self, kind: &'static str, interval: Duration) -> Self {
        if interval.is_zero() {
            debug!(kind, "sweep disabled");
        } else {
            self.schedules.push((kind, interval));
        }
        self
    }

    pub fn schedules(&self) -> &[(&'static str, Duration)] {
        &self.schedules
    }

    /// Enqueue every scheduled kind once, immediately.
    pub async fn run_all_once(&self) -> Result<usize, twinlink_core::TwinlinkError> {
        for (kind, _) in &self.schedules {
            self.queue.enqueue(kind, serde_json::json!({}), None).await?;
        }
        Ok(self.schedules.len())
    }

    /// One task per schedule. The first run happens one interval after start.
    pub fn spawn(self, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        info!(schedules = self.schedules.len(), "starting sweeper");
        self.schedules
            .into_iter()
            .map(|(kind, period)| {
                let queue = self.queue.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    let mut interval = tokio::time::interval(period);
                    interval.tick().await;
                    loop {
                        tokio::select! {
                            _ = interval.tick() => {
                                if let Err(e) =
                                    queue.enqueue(kind, serde_json::json!({}), None).await
                                {
                                    warn!(kind, error = %e, "failed to enqueue periodic job");
                                }
                            }
                            _ = cancel.cancelled() => {
                                debug!(kind, "sweep schedule stopped");
                                break;
                            }
                        }
                    }
                })
            })
            .collect()
    }
}
