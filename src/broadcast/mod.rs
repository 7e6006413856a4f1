//! Cross-instance fan-out of [`NotificationMessage`]s.
//!
//! Every server instance subscribes once to the notification channel and feeds
//! what it receives into its own [`NotificationHub`](crate::websocket::NotificationHub).
//! A worker on any instance can therefore reach a client connected to any other.
//! Redis pub/sub is used when several instances run; the in-memory bus covers a
//! single instance.

pub mod memory_broadcaster;
pub mod redis_broadcaster;
pub mod subscriber;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::{error::Result, notification::NotificationMessage};

pub use memory_broadcaster::MemoryBroadcaster;
pub use redis_broadcaster::RedisBroadcaster;
pub use subscriber::run_subscriber;

/// Raw payloads received on a subscribed channel.
pub type PayloadStream = BoxStream<'static, String>;

#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Every current subscriber of `channel` receives its own copy.
    async fn publish(&self, channel: &str, payload: String) -> Result<()>;

    /// The stream ends if the underlying subscription is lost.
    async fn subscribe(&self, channel: &str) -> Result<PayloadStream>;
}

pub async fn publish_notification(
    bus: &dyn Broadcaster,
    channel: &str,
    message: &NotificationMessage,
) -> Result<()> {
    let payload = serde_json::to_string(message)?;
    bus.publish(channel, payload).await
}
