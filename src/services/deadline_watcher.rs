use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::{
    error::Result,
    notification::NotificationJob,
    queue::{enqueue_job, JobQueue},
    state::WatcherConfig,
    task::DeadlineStore,
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub eligible: usize,
    pub enqueued: usize,
    pub failed: usize,
}

/// Producer side of the pipeline: periodically turns due-soon tasks into
/// queued notification jobs.
pub struct DeadlineWatcher {
    store: Arc<dyn DeadlineStore>,
    queue: Arc<dyn JobQueue>,
    config: WatcherConfig,
}

impl DeadlineWatcher {
    pub fn new(
        store: Arc<dyn DeadlineStore>,
        queue: Arc<dyn JobQueue>,
        config: WatcherConfig,
    ) -> Self {
        Self {
            store,
            queue,
            config,
        }
    }

    /// Scans immediately, then once per configured interval until cancelled.
    pub async fn run(self, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            "Deadline watcher started"
        );

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.tick(Utc::now()).await {
                Ok(report) if report.eligible > 0 => {
                    tracing::info!(
                        eligible = report.eligible,
                        enqueued = report.enqueued,
                        failed = report.failed,
                        "Deadline scan finished"
                    );
                }
                Ok(_) => tracing::debug!("Deadline scan found nothing due"),
                Err(e) => {
                    tracing::error!(error = %e, "Deadline scan failed; retrying next tick");
                }
            }
        }

        tracing::info!("Deadline watcher shutting down");
    }

    /// One scan. A store query failure aborts the scan; an enqueue failure
    /// only skips that task. The job is enqueued before the watermark is
    /// written, so a failed watermark write can lead to a repeat next scan.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickReport> {
        let tasks = self
            .store
            .find_due_soon(
                now,
                self.config.lookahead_horizon,
                self.config.suppression_window,
            )
            .await?;

        let mut report = TickReport {
            eligible: tasks.len(),
            ..TickReport::default()
        };

        for task in tasks {
            let job =
                NotificationJob::for_deadline(task.id, task.user_id, task.deadline_message(), now);

            if let Err(e) = enqueue_job(self.queue.as_ref(), &job).await {
                tracing::error!(
                    task_id = %task.id,
                    user_id = %task.user_id,
                    stage = "enqueue",
                    error = %e,
                    "Failed to queue deadline notification"
                );
                report.failed += 1;
                continue;
            }
            report.enqueued += 1;

            if let Err(e) = self.store.update_last_notified_at(task.id, now).await {
                tracing::warn!(
                    task_id = %task.id,
                    user_id = %task.user_id,
                    stage = "watermark",
                    error = %e,
                    "Notification queued but last_notified_at not updated"
                );
            } else {
                tracing::debug!(task_id = %task.id, "Queued deadline notification");
            }
        }

        Ok(report)
    }
}
