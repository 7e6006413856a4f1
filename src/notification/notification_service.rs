use std::sync::Arc;
use uuid::Uuid;

use super::{notification_models::Notification, notification_repository::NotificationStore};
use crate::error::{AppError, Result};

pub const PAGE_SIZE: i64 = 10;

/// Owner-scoped read side of the notifications table.
#[derive(Clone)]
pub struct NotificationService {
    store: Arc<dyn NotificationStore>,
}

impl NotificationService {
    pub fn new(store: Arc<dyn NotificationStore>) -> Self {
        Self { store }
    }

    /// Newest first, `PAGE_SIZE` per page. Pages below 1 are treated as 1.
    pub async fn get_notifications(&self, user_id: Uuid, page: i64) -> Result<Vec<Notification>> {
        let offset = page.max(1).saturating_sub(1).saturating_mul(PAGE_SIZE);
        self.store.find_by_user(user_id, PAGE_SIZE, offset).await
    }

    pub async fn mark_as_read(&self, id: Uuid, user_id: Uuid) -> Result<Notification> {
        self.store
            .mark_as_read(id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Notification not found".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::{
        notification_models::{NewNotification, TASK_DEADLINE},
        notification_repository::memory::MemoryNotificationStore,
    };

    async fn seed(store: &MemoryNotificationStore, user_id: Uuid, count: usize) {
        for i in 0..count {
            store
                .create(&NewNotification {
                    user_id,
                    task_id: None,
                    notification_type: TASK_DEADLINE.to_string(),
                    message: format!("notification {}", i),
                    dedup_key: None,
                })
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_pagination_and_owner_scope() {
        let store = Arc::new(MemoryNotificationStore::default());
        let owner = Uuid::new_v4();
        seed(&store, owner, 12).await;
        seed(&store, Uuid::new_v4(), 3).await;

        let service = NotificationService::new(store);
        assert_eq!(service.get_notifications(owner, 1).await.unwrap().len(), 10);
        assert_eq!(service.get_notifications(owner, 2).await.unwrap().len(), 2);
        assert_eq!(service.get_notifications(owner, 0).await.unwrap().len(), 10);
        assert!(service.get_notifications(owner, 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_huge_page_is_empty_not_an_overflow() {
        let store = Arc::new(MemoryNotificationStore::default());
        let owner = Uuid::new_v4();
        seed(&store, owner, 3).await;

        let service = NotificationService::new(store);
        assert!(service
            .get_notifications(owner, i64::MAX)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            service.get_notifications(owner, i64::MIN).await.unwrap().len(),
            3
        );
    }

    #[tokio::test]
    async fn test_mark_as_read_is_owner_scoped() {
        let store = Arc::new(MemoryNotificationStore::default());
        let owner = Uuid::new_v4();
        seed(&store, owner, 1).await;
        let id = store.rows()[0].id;

        let service = NotificationService::new(store.clone());
        let err = service.mark_as_read(id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(!store.rows()[0].is_read);

        let read = service.mark_as_read(id, owner).await.unwrap();
        assert!(read.is_read);
    }
}
