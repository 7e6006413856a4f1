use async_trait::async_trait;
use dashmap::DashMap;
use std::{collections::VecDeque, sync::Mutex, time::Duration};
use tokio::{sync::Notify, time::Instant};
use uuid::Uuid;

use super::{JobQueue, ReceivedMessage};
use crate::error::{AppError, Result};

struct Pending {
    body: String,
    receive_count: i32,
}

struct InFlight {
    body: String,
    receive_count: i32,
    visible_at: Instant,
}

/// In-process queue with the same delivery contract as [`super::PgJobQueue`].
/// Only suitable for a single instance: jobs do not survive a restart.
pub struct MemoryJobQueue {
    ready: Mutex<VecDeque<Pending>>,
    in_flight: DashMap<String, InFlight>,
    notify: Notify,
    visibility_timeout: Duration,
}

impl MemoryJobQueue {
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            ready: Mutex::new(VecDeque::new()),
            in_flight: DashMap::new(),
            notify: Notify::new(),
            visibility_timeout,
        }
    }

    fn requeue_expired(&self) -> Result<()> {
        let now = Instant::now();
        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|entry| entry.visible_at <= now)
            .map(|entry| entry.key().clone())
            .collect();

        if expired.is_empty() {
            return Ok(());
        }

        let mut ready = self.ready.lock().map_err(|_| poisoned())?;
        for handle in expired {
            if let Some((_, job)) = self
                .in_flight
                .remove_if(&handle, |_, job| job.visible_at <= now)
            {
                ready.push_back(Pending {
                    body: job.body,
                    receive_count: job.receive_count,
                });
            }
        }
        Ok(())
    }

    fn take(&self, max: usize) -> Result<Vec<ReceivedMessage>> {
        let mut ready = self.ready.lock().map_err(|_| poisoned())?;
        let mut batch = Vec::new();

        while batch.len() < max.max(1) {
            let Some(job) = ready.pop_front() else {
                break;
            };
            let receipt_handle = Uuid::new_v4().to_string();
            let receive_count = job.receive_count + 1;

            self.in_flight.insert(
                receipt_handle.clone(),
                InFlight {
                    body: job.body.clone(),
                    receive_count,
                    visible_at: Instant::now() + self.visibility_timeout,
                },
            );
            batch.push(ReceivedMessage {
                body: job.body,
                receipt_handle,
                receive_count,
            });
        }

        Ok(batch)
    }
}

#[cfg(test)]
impl MemoryJobQueue {
    /// Messages either waiting or in flight.
    pub fn len(&self) -> usize {
        self.ready.lock().map(|ready| ready.len()).unwrap_or(0) + self.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> AppError {
    AppError::Queue("memory queue lock poisoned".to_string())
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, body: &str) -> Result<()> {
        self.ready.lock().map_err(|_| poisoned())?.push_back(Pending {
            body: body.to_string(),
            receive_count: 0,
        });
        self.notify.notify_one();
        Ok(())
    }

    async fn receive(&self, max: usize, wait: Duration) -> Result<Vec<ReceivedMessage>> {
        let deadline = Instant::now() + wait;

        loop {
            self.requeue_expired()?;
            let batch = self.take(max)?;
            if !batch.is_empty() {
                return Ok(batch);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(Vec::new());
            }
            // Wake on enqueue, or re-check once an in-flight lease may have lapsed.
            let _ = tokio::time::timeout(
                remaining.min(self.visibility_timeout),
                self.notify.notified(),
            )
            .await;
        }
    }

    async fn delete(&self, receipt_handle: &str) -> Result<()> {
        self.in_flight.remove(receipt_handle);
        Ok(())
    }
}
