use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::stream::StreamExt;
use uuid::Uuid;

use super::{ClientRegistration, NotificationHub};
use crate::{middleware::AuthUser, state::AppState};

/// Real-time notification stream (WebSocket)
#[utoipa::path(
    get,
    path = "/api/notifications/ws",
    params(
        ("token" = Option<String>, Query, description = "Bearer token for clients that cannot set headers")
    ),
    responses(
        (status = 101, description = "Switching protocols; notifications are pushed as JSON text frames"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "notifications",
    security(("bearer_auth" = []))
)]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Response {
    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, user_id, hub))
}

/// Hands the write half to the hub, then reads and discards inbound frames
/// until the client goes away.
async fn handle_socket(socket: WebSocket, user_id: Uuid, hub: NotificationHub) {
    let (sender, mut receiver) = socket.split();
    let registration = ClientRegistration::new(user_id, Box::new(sender));
    let connection_id = registration.connection_id;

    if let Err(e) = hub.register(registration).await {
        tracing::error!(%user_id, "Failed to register WebSocket connection: {}", e);
        return;
    }

    while let Some(Ok(msg)) = receiver.next().await {
        if let Message::Close(_) = msg {
            break;
        }
    }

    if let Err(e) = hub.unregister(user_id, connection_id).await {
        tracing::warn!(%user_id, "Failed to unregister WebSocket connection: {}", e);
    }
    tracing::info!(%user_id, %connection_id, "WebSocket connection closed");
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};
    use tokio_tungstenite::tungstenite::Message as WsMessage;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::{
        auth::jwt::create_access_token,
        notification::{
            notification_models::TASK_DEADLINE,
            notification_repository::memory::MemoryNotificationStore, NotificationMessage,
            NotificationService,
        },
        routes::create_router,
        state::Config,
    };

    const SECRET: &str = "ws-test-secret";

    async fn serve(hub: NotificationHub) -> std::net::SocketAddr {
        let state = AppState {
            config: Arc::new(Config::for_tests(SECRET)),
            notification_service: NotificationService::new(Arc::new(
                MemoryNotificationStore::default(),
            )),
            hub,
        };
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, create_router(state)).await });
        addr
    }

    async fn wait_for_online(hub: &NotificationHub, expected: &[Uuid]) {
        for _ in 0..200 {
            if hub.online_users().await.unwrap() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("hub never reached {:?}", expected);
    }

    #[tokio::test]
    async fn test_socket_registers_receives_and_unregisters() {
        let (hub, runner) = NotificationHub::with_write_timeout(Duration::from_secs(1));
        let token = CancellationToken::new();
        tokio::spawn(runner.run(token.clone()));
        let addr = serve(hub.clone()).await;

        let owner = Uuid::new_v4();
        let url = format!(
            "ws://{}/api/notifications/ws?token={}",
            addr,
            create_access_token(owner, SECRET)
        );
        let (mut client, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        wait_for_online(&hub, &[owner]).await;

        // inbound frames are read and ignored
        futures::SinkExt::send(&mut client, WsMessage::Text("ping".to_string()))
            .await
            .unwrap();

        let message = NotificationMessage {
            id: Some(Uuid::new_v4()),
            user_id: owner,
            notification_type: TASK_DEADLINE.to_string(),
            message: "Task \"Ship it\" is due soon (due: 10:00 UTC)".to_string(),
        };
        hub.deliver(message.clone()).await.unwrap();

        let frame = tokio::time::timeout(Duration::from_secs(2), client.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let received: NotificationMessage = serde_json::from_str(frame.to_text().unwrap()).unwrap();
        assert_eq!(received, message);

        client.close(None).await.unwrap();
        wait_for_online(&hub, &[]).await;

        token.cancel();
    }

    #[tokio::test]
    async fn test_upgrade_without_token_is_rejected() {
        let (hub, runner) = NotificationHub::with_write_timeout(Duration::from_secs(1));
        let token = CancellationToken::new();
        tokio::spawn(runner.run(token.clone()));
        let addr = serve(hub.clone()).await;

        let url = format!("ws://{}/api/notifications/ws", addr);
        assert!(tokio_tungstenite::connect_async(url).await.is_err());
        assert!(hub.online_users().await.unwrap().is_empty());

        token.cancel();
    }
}
