//! # Connection hub
//!
//! Registry of live client connections keyed by owner. The registry map is
//! owned by a single event loop ([`HubRunner::run`]); everything else talks to
//! it through a cloneable [`NotificationHub`] handle that sends events over one
//! channel, so register, unregister and deliver are applied in the order they
//! were sent and two writes to the same connection never overlap.
//!
//! ```text
//! ws handler ──register/unregister──┐
//!                                   ├──► HubRunner ──► ClientSink (per owner)
//! fan-out subscriber ──deliver──────┘
//! ```
//!
//! ## Rules
//! - At most one connection per owner; registering again closes the previous one.
//! - A failed or timed-out write closes and removes that connection.
//! - A message for an owner with no connection is dropped, not queued.
//! - Shutdown stops the loop without closing open connections.
//!
//! Every write and close is bounded by the hub's write timeout, so a client
//! that stops reading costs the loop at most two timeouts before it is
//! dropped. Deliveries to other owners wait behind it for that long.

use std::{collections::HashMap, time::Duration};

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::connection::ClientSink;
use crate::{
    error::{AppError, Result},
    notification::NotificationMessage,
};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A connection handed over to the hub. Ownership of the sink moves to the
/// hub when the registration is sent.
pub struct ClientRegistration {
    pub user_id: Uuid,
    pub connection_id: Uuid,
    pub sink: Box<dyn ClientSink>,
}

impl ClientRegistration {
    pub fn new(user_id: Uuid, sink: Box<dyn ClientSink>) -> Self {
        Self {
            user_id,
            connection_id: Uuid::new_v4(),
            sink,
        }
    }
}

enum HubEvent {
    Register(ClientRegistration),
    Unregister { user_id: Uuid, connection_id: Uuid },
    Deliver(NotificationMessage),
    OnlineUsers(oneshot::Sender<Vec<Uuid>>),
}

#[derive(Clone)]
pub struct NotificationHub {
    events: mpsc::Sender<HubEvent>,
}

impl NotificationHub {
    #[cfg(test)]
    pub fn new() -> (Self, HubRunner) {
        Self::with_write_timeout(Duration::from_secs(5))
    }

    /// Creates the handle and the loop that must be spawned with [`HubRunner::run`].
    /// `write_timeout` bounds every write and close to a client.
    pub fn with_write_timeout(write_timeout: Duration) -> (Self, HubRunner) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let runner = HubRunner {
            events: rx,
            clients: HashMap::new(),
            write_timeout,
        };
        (Self { events: tx }, runner)
    }

    pub async fn register(&self, registration: ClientRegistration) -> Result<()> {
        self.send(HubEvent::Register(registration)).await
    }

    /// Removes the owner's connection only if it is still `connection_id`.
    pub async fn unregister(&self, user_id: Uuid, connection_id: Uuid) -> Result<()> {
        self.send(HubEvent::Unregister {
            user_id,
            connection_id,
        })
        .await
    }

    pub async fn deliver(&self, message: NotificationMessage) -> Result<()> {
        self.send(HubEvent::Deliver(message)).await
    }

    pub async fn online_users(&self) -> Result<Vec<Uuid>> {
        let (tx, rx) = oneshot::channel();
        self.send(HubEvent::OnlineUsers(tx)).await?;
        rx.await.map_err(|_| hub_stopped())
    }

    async fn send(&self, event: HubEvent) -> Result<()> {
        self.events.send(event).await.map_err(|_| hub_stopped())
    }
}

fn hub_stopped() -> AppError {
    AppError::Delivery("notification hub is not running".to_string())
}

struct ClientEntry {
    connection_id: Uuid,
    sink: Box<dyn ClientSink>,
}

pub struct HubRunner {
    events: mpsc::Receiver<HubEvent>,
    clients: HashMap<Uuid, ClientEntry>,
    write_timeout: Duration,
}

impl HubRunner {
    pub async fn run(mut self, token: CancellationToken) {
        tracing::info!("Notification hub is running");

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    tracing::info!("Notification hub shutting down");
                    break;
                }
                event = self.events.recv() => match event {
                    Some(event) => self.handle(event).await,
                    None => {
                        tracing::info!("All hub handles dropped; stopping");
                        break;
                    }
                },
            }
        }
    }

    async fn handle(&mut self, event: HubEvent) {
        match event {
            HubEvent::Register(registration) => self.register(registration).await,
            HubEvent::Unregister {
                user_id,
                connection_id,
            } => self.unregister(user_id, connection_id).await,
            HubEvent::Deliver(message) => self.deliver(message).await,
            HubEvent::OnlineUsers(reply) => {
                let _ = reply.send(self.clients.keys().copied().collect());
            }
        }
    }

    async fn register(&mut self, registration: ClientRegistration) {
        let user_id = registration.user_id;
        let entry = ClientEntry {
            connection_id: registration.connection_id,
            sink: registration.sink,
        };

        if let Some(previous) = self.clients.insert(user_id, entry) {
            self.close(user_id, previous).await;
            tracing::info!(%user_id, "Replaced existing connection");
        }
        tracing::info!(%user_id, connection_id = %registration.connection_id, "User connected");
    }

    async fn unregister(&mut self, user_id: Uuid, connection_id: Uuid) {
        let is_current = self
            .clients
            .get(&user_id)
            .is_some_and(|entry| entry.connection_id == connection_id);

        if !is_current {
            tracing::debug!(%user_id, %connection_id, "Unregister for inactive connection ignored");
            return;
        }

        if let Some(entry) = self.clients.remove(&user_id) {
            self.close(user_id, entry).await;
            tracing::info!(%user_id, "User disconnected");
        }
    }

    async fn deliver(&mut self, message: NotificationMessage) {
        let user_id = message.user_id;
        let Some(entry) = self.clients.get_mut(&user_id) else {
            tracing::debug!(%user_id, "Recipient not connected; dropping message");
            return;
        };

        let outcome = match tokio::time::timeout(self.write_timeout, entry.sink.send(&message)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Delivery("write timed out".to_string())),
        };

        match outcome {
            Ok(()) => tracing::info!(%user_id, notification_id = ?message.id, "Notification delivered"),
            Err(e) => {
                tracing::warn!(%user_id, error = %e, "Failed to write notification; dropping connection");
                if let Some(entry) = self.clients.remove(&user_id) {
                    self.close(user_id, entry).await;
                }
            }
        }
    }

    /// Sends a close frame if the client takes it in time; otherwise the sink
    /// is just dropped.
    async fn close(&self, user_id: Uuid, mut entry: ClientEntry) {
        if tokio::time::timeout(self.write_timeout, entry.sink.close())
            .await
            .is_err()
        {
            tracing::warn!(%user_id, connection_id = %entry.connection_id, "Close timed out; dropping connection");
        }
    }
}
