use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::task_models::{Task, TaskStatus};
use crate::error::Result;

/// The two task operations the deadline pipeline depends on.
#[async_trait]
pub trait DeadlineStore: Send + Sync {
    /// Tasks that are open, due before `now + horizon`, and whose
    /// `last_notified_at` is null or older than `now - suppression`.
    /// Ordered by due date.
    async fn find_due_soon(
        &self,
        now: DateTime<Utc>,
        horizon: Duration,
        suppression: Duration,
    ) -> Result<Vec<Task>>;

    async fn update_last_notified_at(&self, task_id: Uuid, notified_at: DateTime<Utc>)
        -> Result<()>;
}

#[derive(Clone)]
pub struct TaskRepository {
    pool: PgPool,
}

impl TaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeadlineStore for TaskRepository {
    async fn find_due_soon(
        &self,
        now: DateTime<Utc>,
        horizon: Duration,
        suppression: Duration,
    ) -> Result<Vec<Task>> {
        let tasks = sqlx::query_as::<_, Task>(
            "SELECT * FROM tasks
             WHERE deleted_at IS NULL
             AND status <> $1
             AND due_date <= $2
             AND (last_notified_at IS NULL OR last_notified_at < $3)
             ORDER BY due_date ASC",
        )
        .bind(TaskStatus::Completed.as_str())
        .bind(now + horizon)
        .bind(now - suppression)
        .fetch_all(&self.pool)
        .await?;

        Ok(tasks)
    }

    async fn update_last_notified_at(
        &self,
        task_id: Uuid,
        notified_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query("UPDATE tasks SET last_notified_at = $1 WHERE id = $2")
            .bind(notified_at)
            .bind(task_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
