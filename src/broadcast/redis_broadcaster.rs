use async_trait::async_trait;
use futures::StreamExt;
use redis::{aio::MultiplexedConnection, AsyncCommands};

use super::{Broadcaster, PayloadStream};
use crate::error::Result;

/// Redis pub/sub bus shared by all server instances.
#[derive(Clone)]
pub struct RedisBroadcaster {
    client: redis::Client,
    publisher: MultiplexedConnection,
}

impl RedisBroadcaster {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let publisher = client.get_multiplexed_async_connection().await?;
        tracing::info!("Redis client connected");

        Ok(Self { client, publisher })
    }
}

#[async_trait]
impl Broadcaster for RedisBroadcaster {
    async fn publish(&self, channel: &str, payload: String) -> Result<()> {
        let mut conn = self.publisher.clone();
        conn.publish::<_, _, ()>(channel, payload).await?;
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<PayloadStream> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;
        tracing::info!(channel, "Subscribed to Redis channel");

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            match msg.get_payload::<String>() {
                Ok(payload) => Some(payload),
                Err(e) => {
                    tracing::warn!("Discarding non-UTF-8 Redis payload: {}", e);
                    None
                }
            }
        });

        Ok(stream.boxed())
    }
}
