use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::notification_models::{NewNotification, Notification};
use crate::error::Result;

#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Inserts an unread notification. Returns `None` when a row with the
    /// same dedup key already exists.
    async fn create(&self, new: &NewNotification) -> Result<Option<Notification>>;

    async fn find_by_user(&self, user_id: Uuid, limit: i64, offset: i64)
        -> Result<Vec<Notification>>;

    async fn find_by_dedup_key(&self, dedup_key: &str) -> Result<Option<Notification>>;

    /// Owner-scoped; `None` when the id does not belong to `user_id`.
    async fn mark_as_read(&self, id: Uuid, user_id: Uuid) -> Result<Option<Notification>>;
}

#[derive(Clone)]
pub struct NotificationRepository {
    pool: PgPool,
}

impl NotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationStore for NotificationRepository {
    async fn create(&self, new: &NewNotification) -> Result<Option<Notification>> {
        let notification = sqlx::query_as::<_, Notification>(
            "INSERT INTO notifications (user_id, task_id, type, message, dedup_key)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (dedup_key) WHERE dedup_key IS NOT NULL DO NOTHING
             RETURNING *",
        )
        .bind(new.user_id)
        .bind(new.task_id)
        .bind(&new.notification_type)
        .bind(&new.message)
        .bind(new.dedup_key.as_deref())
        .fetch_optional(&self.pool)
        .await?;

        Ok(notification)
    }

    async fn find_by_user(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Notification>> {
        let notifications = sqlx::query_as::<_, Notification>(
            "SELECT * FROM notifications WHERE user_id = $1
             ORDER BY created_at DESC
             LIMIT $2 OFFSET $3",
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(notifications)
    }

    async fn find_by_dedup_key(&self, dedup_key: &str) -> Result<Option<Notification>> {
        let notification =
            sqlx::query_as::<_, Notification>("SELECT * FROM notifications WHERE dedup_key = $1")
                .bind(dedup_key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(notification)
    }

    async fn mark_as_read(&self, id: Uuid, user_id: Uuid) -> Result<Option<Notification>> {
        let notification = sqlx::query_as::<_, Notification>(
            "UPDATE notifications SET is_read = true WHERE id = $1 AND user_id = $2 RETURNING *",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(notification)
    }
}
