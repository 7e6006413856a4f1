use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::sleep_or_cancelled;
use crate::{
    broadcast::{publish_notification, Broadcaster},
    notification::{
        notification_models::TASK_DEADLINE, NotificationJob, NotificationMessage,
        NotificationStore,
    },
    queue::{JobQueue, ReceivedMessage},
    state::WorkerConfig,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Published and deleted. `notification_id` is `None` if persistence failed.
    Delivered { notification_id: Option<Uuid> },
    /// A row for this job's dedup key already existed. Published again with
    /// that row's id, since the earlier attempt may have stopped before
    /// publishing, then deleted. No second row is written.
    Duplicate { notification_id: Option<Uuid> },
    /// Unparseable body; left on the queue.
    Malformed,
}

/// Consumer side of the pipeline: persists each queued job as a notification
/// and publishes it to the fan-out bus. At-least-once: the queue message is
/// deleted only after both steps have been attempted.
pub struct NotificationWorker {
    queue: Arc<dyn JobQueue>,
    notifications: Arc<dyn NotificationStore>,
    bus: Arc<dyn Broadcaster>,
    channel: String,
    config: WorkerConfig,
}

impl NotificationWorker {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        notifications: Arc<dyn NotificationStore>,
        bus: Arc<dyn Broadcaster>,
        channel: String,
        config: WorkerConfig,
    ) -> Self {
        Self {
            queue,
            notifications,
            bus,
            channel,
            config,
        }
    }

    pub async fn run(self, token: CancellationToken) {
        tracing::info!("Notification worker started");

        loop {
            if token.is_cancelled() {
                break;
            }

            let received = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                received = self.queue.receive(self.config.max_messages, self.config.wait) => received,
            };

            match received {
                Ok(messages) => {
                    for message in &messages {
                        self.process(message).await;
                    }
                }
                Err(e) => {
                    tracing::error!(stage = "receive", error = %e, "Failed to receive jobs");
                    if sleep_or_cancelled(&token, self.config.error_backoff).await {
                        break;
                    }
                }
            }
        }

        tracing::info!("Notification worker shutting down");
    }

    pub async fn process(&self, received: &ReceivedMessage) -> ProcessOutcome {
        let job: NotificationJob = match serde_json::from_str(&received.body) {
            Ok(job) => job,
            Err(e) => {
                tracing::error!(
                    stage = "parse",
                    receive_count = received.receive_count,
                    error = %e,
                    "Failed to parse notification job; leaving it on the queue"
                );
                return ProcessOutcome::Malformed;
            }
        };

        let user_id = job.user_id;
        let task_id = job.task_id;

        let mut duplicate = false;
        let notification_id = match self
            .notifications
            .create(&job.clone().into_new_notification())
            .await
        {
            Ok(Some(notification)) => Some(notification.id),
            Ok(None) => {
                duplicate = true;
                tracing::info!(%user_id, %task_id, "Job already persisted; republishing existing notification");
                self.existing_id(&job).await
            }
            Err(e) => {
                tracing::error!(
                    %user_id,
                    %task_id,
                    stage = "persist",
                    error = %e,
                    "Failed to save notification; publishing without id"
                );
                None
            }
        };

        let message = NotificationMessage {
            id: notification_id,
            user_id,
            notification_type: TASK_DEADLINE.to_string(),
            message: job.message,
        };

        if let Err(e) = publish_notification(self.bus.as_ref(), &self.channel, &message).await {
            tracing::error!(
                %user_id,
                %task_id,
                stage = "publish",
                error = %e,
                "Failed to publish notification"
            );
        }

        self.delete(received, user_id, task_id).await;
        if duplicate {
            ProcessOutcome::Duplicate { notification_id }
        } else {
            ProcessOutcome::Delivered { notification_id }
        }
    }

    async fn existing_id(&self, job: &NotificationJob) -> Option<Uuid> {
        let dedup_key = job.dedup_key.as_deref()?;
        match self.notifications.find_by_dedup_key(dedup_key).await {
            Ok(existing) => existing.map(|notification| notification.id),
            Err(e) => {
                tracing::warn!(
                    user_id = %job.user_id,
                    task_id = %job.task_id,
                    stage = "persist",
                    error = %e,
                    "Failed to look up existing notification; publishing without id"
                );
                None
            }
        }
    }

    async fn delete(&self, received: &ReceivedMessage, user_id: Uuid, task_id: Uuid) {
        if let Err(e) = self.queue.delete(&received.receipt_handle).await {
            tracing::warn!(
                %user_id,
                %task_id,
                stage = "delete",
                error = %e,
                "Failed to delete job; it will be redelivered"
            );
        }
    }
}
