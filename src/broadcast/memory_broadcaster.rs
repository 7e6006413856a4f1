use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};

use super::{Broadcaster, PayloadStream};
use crate::error::Result;

const DEFAULT_CAPACITY: usize = 100;

/// `tokio::sync::broadcast` channel per name. Slow subscribers that fall
/// more than `capacity` messages behind skip the missed ones.
pub struct MemoryBroadcaster {
    channels: DashMap<String, broadcast::Sender<String>>,
    capacity: usize,
}

impl MemoryBroadcaster {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity,
        }
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<String> {
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for MemoryBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broadcaster for MemoryBroadcaster {
    async fn publish(&self, channel: &str, payload: String) -> Result<()> {
        // No subscribers yet is not a failure.
        let _ = self.sender(channel).send(payload);
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<PayloadStream> {
        let channel_name = channel.to_string();
        let stream = BroadcastStream::new(self.sender(channel).subscribe()).filter_map(
            move |item| {
                let channel_name = channel_name.clone();
                async move {
                    match item {
                        Ok(payload) => Some(payload),
                        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                            tracing::warn!(
                                channel = %channel_name,
                                skipped,
                                "Fan-out subscriber lagged; messages dropped"
                            );
                            None
                        }
                    }
                }
            },
        );

        Ok(stream.boxed())
    }
}
