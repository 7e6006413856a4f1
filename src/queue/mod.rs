//! Durable, at-least-once job queue between the deadline watcher and the
//! notification worker.
//!
//! A received message stays invisible to other consumers for the
//! visibility timeout. If it is not deleted before the timeout elapses it is
//! delivered again, so consumers must tolerate duplicates.

pub mod memory_queue;
pub mod pg_queue;

use async_trait::async_trait;
use std::time::Duration;

use crate::{error::Result, notification::NotificationJob};

pub use memory_queue::MemoryJobQueue;
pub use pg_queue::PgJobQueue;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub body: String,
    /// Opaque handle valid for one delivery; pass it to [`JobQueue::delete`].
    pub receipt_handle: String,
    pub receive_count: i32,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, body: &str) -> Result<()>;

    /// Long-polls for up to `max` messages, returning an empty batch once
    /// `wait` elapses with nothing visible.
    async fn receive(&self, max: usize, wait: Duration) -> Result<Vec<ReceivedMessage>>;

    /// Removes a delivered message. Unknown or stale handles are ignored.
    async fn delete(&self, receipt_handle: &str) -> Result<()>;
}

pub async fn enqueue_job(queue: &dyn JobQueue, job: &NotificationJob) -> Result<()> {
    let body = serde_json::to_string(job)?;
    queue.enqueue(&body).await
}
