use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

pub const TASK_DEADLINE: &str = "task_deadline";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub task_id: Option<Uuid>,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub notification_type: String,
    pub message: String,
    pub is_read: bool,
    #[serde(skip)]
    pub dedup_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a notification row. `is_read` always starts false.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub task_id: Option<Uuid>,
    pub notification_type: String,
    pub message: String,
    pub dedup_key: Option<String>,
}

/// Queue message produced by the deadline watcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationJob {
    pub task_id: Uuid,
    pub user_id: Uuid,
    pub message: String,
    /// `{task_id}:{watermark}`; repeated deliveries of one job share it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedup_key: Option<String>,
}

impl NotificationJob {
    pub fn for_deadline(
        task_id: Uuid,
        user_id: Uuid,
        message: String,
        watermark: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id,
            user_id,
            message,
            dedup_key: Some(format!("{}:{}", task_id, watermark.timestamp())),
        }
    }

    pub fn into_new_notification(self) -> NewNotification {
        NewNotification {
            user_id: self.user_id,
            task_id: Some(self.task_id),
            notification_type: TASK_DEADLINE.to_string(),
            message: self.message,
            dedup_key: self.dedup_key,
        }
    }
}

/// Payload carried over the fan-out bus and written to live connections.
/// `user_id` is the routing key; `id` is absent when persistence failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct NotificationMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub message: String,
}

impl From<&Notification> for NotificationMessage {
    fn from(notification: &Notification) -> Self {
        Self {
            id: Some(notification.id),
            user_id: notification.user_id,
            notification_type: notification.notification_type.clone(),
            message: notification.message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_job_wire_format() {
        let task_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let raw = json!({
            "task_id": task_id,
            "user_id": user_id,
            "message": "due soon",
        });

        let job: NotificationJob = serde_json::from_value(raw).unwrap();
        assert_eq!(job.user_id, user_id);
        assert_eq!(job.dedup_key, None);

        let encoded = serde_json::to_value(&job).unwrap();
        assert_eq!(encoded["task_id"], json!(task_id));
        assert!(encoded.get("dedup_key").is_none());
    }

    #[test]
    fn test_dedup_key_combines_task_and_watermark() {
        let task_id = Uuid::new_v4();
        let watermark = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let job = NotificationJob::for_deadline(task_id, Uuid::new_v4(), "m".into(), watermark);

        assert_eq!(job.dedup_key, Some(format!("{}:1700000000", task_id)));
        assert_eq!(job.into_new_notification().notification_type, TASK_DEADLINE);
    }

    #[test]
    fn test_message_without_id_keeps_routing_key() {
        let user_id = Uuid::new_v4();
        let msg = NotificationMessage {
            id: None,
            user_id,
            notification_type: TASK_DEADLINE.to_string(),
            message: "due soon".to_string(),
        };

        let encoded = serde_json::to_value(&msg).unwrap();
        assert!(encoded.get("id").is_none());
        assert_eq!(encoded["type"], "task_deadline");

        let decoded: NotificationMessage = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded.user_id, user_id);
        assert_eq!(decoded, msg);
    }
}
