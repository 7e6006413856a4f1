use futures::StreamExt;
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

use super::Broadcaster;
use crate::{
    notification::NotificationMessage, services::sleep_or_cancelled, websocket::NotificationHub,
};

/// Forwards every message published on `channel` into this instance's hub.
///
/// Malformed payloads are skipped. If the subscription cannot be opened or
/// its stream ends, the loop waits `retry_backoff` and subscribes again.
pub async fn run_subscriber(
    bus: Arc<dyn Broadcaster>,
    channel: String,
    hub: NotificationHub,
    retry_backoff: Duration,
    token: CancellationToken,
) {
    tracing::info!(channel = %channel, "Fan-out subscriber started");

    loop {
        let subscription = tokio::select! {
            _ = token.cancelled() => break,
            subscription = bus.subscribe(&channel) => subscription,
        };

        match subscription {
            Ok(mut stream) => loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        tracing::info!("Fan-out subscriber shutting down");
                        return;
                    }
                    payload = stream.next() => match payload {
                        Some(payload) => forward(&hub, &payload).await,
                        None => {
                            tracing::warn!(channel = %channel, "Subscription ended; resubscribing");
                            break;
                        }
                    },
                }
            },
            Err(e) => {
                tracing::error!(channel = %channel, error = %e, "Failed to subscribe");
            }
        }

        if sleep_or_cancelled(&token, retry_backoff).await {
            break;
        }
    }

    tracing::info!("Fan-out subscriber shutting down");
}

async fn forward(hub: &NotificationHub, payload: &str) {
    let message: NotificationMessage = match serde_json::from_str(payload) {
        Ok(message) => message,
        Err(e) => {
            tracing::error!(error = %e, "Failed to decode broadcast payload; skipping");
            return;
        }
    };

    tracing::debug!(user_id = %message.user_id, "Broadcast received");
    if let Err(e) = hub.deliver(message).await {
        tracing::warn!(error = %e, "Hub unavailable; broadcast dropped");
    }
}
