use async_trait::async_trait;
use sqlx::PgPool;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use super::{JobQueue, ReceivedMessage};
use crate::error::{AppError, Result};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Queue stored in the `notification_jobs` table. Claims use
/// `FOR UPDATE SKIP LOCKED` so several workers can share it.
#[derive(Clone)]
pub struct PgJobQueue {
    pool: PgPool,
    visibility_timeout: Duration,
    poll_interval: Duration,
}

impl PgJobQueue {
    pub fn new(pool: PgPool, visibility_timeout: Duration) -> Self {
        Self {
            pool,
            visibility_timeout,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    async fn claim(&self, max: usize) -> Result<Vec<ReceivedMessage>> {
        let rows = sqlx::query_as::<_, (String, Uuid, i32)>(
            "UPDATE notification_jobs SET
                receipt_handle = gen_random_uuid(),
                receive_count = receive_count + 1,
                visible_at = NOW() + make_interval(secs => $2)
             WHERE id IN (
                SELECT id FROM notification_jobs
                WHERE visible_at <= NOW()
                ORDER BY enqueued_at
                LIMIT $1
                FOR UPDATE SKIP LOCKED
             )
             RETURNING body, receipt_handle, receive_count",
        )
        .bind(max as i64)
        .bind(self.visibility_timeout.as_secs_f64())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(body, handle, receive_count)| ReceivedMessage {
                body,
                receipt_handle: handle.to_string(),
                receive_count,
            })
            .collect())
    }
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn enqueue(&self, body: &str) -> Result<()> {
        sqlx::query("INSERT INTO notification_jobs (body) VALUES ($1)")
            .bind(body)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn receive(&self, max: usize, wait: Duration) -> Result<Vec<ReceivedMessage>> {
        let deadline = Instant::now() + wait;

        loop {
            let batch = self.claim(max.max(1)).await?;
            if !batch.is_empty() {
                return Ok(batch);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(Vec::new());
            }
            tokio::time::sleep(self.poll_interval.min(remaining)).await;
        }
    }

    async fn delete(&self, receipt_handle: &str) -> Result<()> {
        let handle = Uuid::parse_str(receipt_handle)
            .map_err(|_| AppError::Queue(format!("invalid receipt handle '{}'", receipt_handle)))?;

        sqlx::query("DELETE FROM notification_jobs WHERE receipt_handle = $1")
            .bind(handle)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
