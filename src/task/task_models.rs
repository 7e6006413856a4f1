use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(TaskStatus::Pending),
            "in_progress" => Some(TaskStatus::InProgress),
            "completed" => Some(TaskStatus::Completed),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row of the `tasks` table. Only `last_notified_at` is written by the
/// notification pipeline; everything else belongs to the CRUD layer.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub due_date: DateTime<Utc>,
    pub status: String,
    pub last_notified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn status(&self) -> Option<TaskStatus> {
        TaskStatus::parse(&self.status)
    }

    pub fn is_completed(&self) -> bool {
        self.status() == Some(TaskStatus::Completed)
    }

    /// Mirrors the `find_due_soon` query: open, not deleted, due before
    /// `now + horizon`, and not notified within the suppression window.
    pub fn is_notification_due(
        &self,
        now: DateTime<Utc>,
        horizon: Duration,
        suppression: Duration,
    ) -> bool {
        self.deleted_at.is_none()
            && !self.is_completed()
            && self.due_date <= now + horizon
            && self
                .last_notified_at
                .map_or(true, |notified_at| notified_at < now - suppression)
    }

    pub fn deadline_message(&self) -> String {
        format!(
            "Task \"{}\" is due soon (due: {} UTC)",
            self.title,
            self.due_date.format("%H:%M")
        )
    }
}

#[cfg(test)]
pub(crate) fn sample_task(due_date: DateTime<Utc>) -> Task {
    let now = Utc::now();
    Task {
        id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        title: "Write quarterly report".to_string(),
        description: None,
        due_date,
        status: TaskStatus::Pending.to_string(),
        last_notified_at: None,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hour() -> Duration {
        Duration::minutes(60)
    }

    #[test]
    fn test_task_status_display() {
        assert_eq!(TaskStatus::Pending.to_string(), "pending");
        assert_eq!(TaskStatus::InProgress.to_string(), "in_progress");
        assert_eq!(TaskStatus::Completed.to_string(), "completed");
    }

    #[test]
    fn test_task_status_parse() {
        assert_eq!(TaskStatus::parse("in_progress"), Some(TaskStatus::InProgress));
        assert_eq!(TaskStatus::parse("Completed"), None);
    }

    #[test]
    fn test_due_within_horizon_and_never_notified_is_eligible() {
        let now = Utc::now();
        let task = sample_task(now + Duration::minutes(30));
        assert!(task.is_notification_due(now, hour(), hour()));
    }

    #[test]
    fn test_recently_notified_is_suppressed() {
        let now = Utc::now();
        let mut task = sample_task(now + Duration::minutes(30));
        task.last_notified_at = Some(now - Duration::minutes(1));
        assert!(!task.is_notification_due(now, hour(), hour()));

        task.last_notified_at = Some(now - Duration::minutes(61));
        assert!(task.is_notification_due(now, hour(), hour()));
    }

    #[test]
    fn test_outside_horizon_completed_or_deleted_are_not_eligible() {
        let now = Utc::now();

        let far = sample_task(now + Duration::hours(3));
        assert!(!far.is_notification_due(now, hour(), hour()));

        let mut done = sample_task(now + Duration::minutes(10));
        done.status = TaskStatus::Completed.to_string();
        assert!(!done.is_notification_due(now, hour(), hour()));

        let mut deleted = sample_task(now + Duration::minutes(10));
        deleted.deleted_at = Some(now);
        assert!(!deleted.is_notification_due(now, hour(), hour()));
    }

    #[test]
    fn test_overdue_open_task_stays_eligible() {
        let now = Utc::now();
        let mut task = sample_task(now - Duration::minutes(5));
        task.status = TaskStatus::InProgress.to_string();
        assert!(task.is_notification_due(now, hour(), hour()));
    }

    #[test]
    fn test_deadline_message_mentions_title_and_time() {
        let due = DateTime::parse_from_rfc3339("2026-03-01T09:45:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let task = sample_task(due);
        assert_eq!(
            task.deadline_message(),
            "Task \"Write quarterly report\" is due soon (due: 09:45 UTC)"
        );
    }
}
