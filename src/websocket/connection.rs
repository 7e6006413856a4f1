use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::{sink::SinkExt, stream::SplitSink};

use crate::{
    error::{AppError, Result},
    notification::NotificationMessage,
};

/// Write half of a live client connection, owned by the hub once registered.
#[async_trait]
pub trait ClientSink: Send + Sync {
    async fn send(&mut self, message: &NotificationMessage) -> Result<()>;

    /// Best effort; errors are ignored because the connection is being dropped.
    async fn close(&mut self);
}

#[async_trait]
impl ClientSink for SplitSink<WebSocket, Message> {
    async fn send(&mut self, message: &NotificationMessage) -> Result<()> {
        let json = serde_json::to_string(message)?;
        SinkExt::send(self, Message::Text(json))
            .await
            .map_err(|e| AppError::Delivery(e.to_string()))
    }

    async fn close(&mut self) {
        let _ = SinkExt::send(self, Message::Close(None)).await;
        let _ = SinkExt::close(self).await;
    }
}
