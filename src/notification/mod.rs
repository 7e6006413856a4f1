pub mod notification_dto;
pub mod notification_handlers;
pub mod notification_models;
pub mod notification_repository;
pub mod notification_service;

pub use notification_handlers::{get_notifications, mark_notification_read};
pub use notification_models::{Notification, NotificationJob, NotificationMessage};
pub use notification_repository::{NotificationRepository, NotificationStore};
pub use notification_service::NotificationService;
