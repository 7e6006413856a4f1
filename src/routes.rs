use crate::{
    middleware::auth_middleware,
    notification::{self, Notification, NotificationMessage},
    state::AppState,
    websocket,
};
use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    routing::{get, patch},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        notification::notification_handlers::get_notifications,
        notification::notification_handlers::mark_notification_read,
        websocket::handler::ws_handler,
    ),
    components(schemas(Notification, NotificationMessage)),
    tags(
        (name = "notifications", description = "Deadline notification endpoints")
    ),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::Http::new(
                        utoipa::openapi::security::HttpAuthScheme::Bearer,
                    ),
                ),
            )
        }
    }
}

/// Liveness, including a round trip through the connection hub.
async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.hub.online_users().await {
        Ok(users) => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "connections": users.len() })),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable" })),
            )
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Protected routes (auth required)
    let notification_routes = Router::new()
        .route("/", get(notification::get_notifications))
        .route("/:id/read", patch(notification::mark_notification_read))
        .route("/ws", get(websocket::ws_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let api_routes = Router::new().nest("/notifications", notification_routes);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(health))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::jwt::create_access_token,
        notification::{
            notification_models::{NewNotification, TASK_DEADLINE},
            notification_repository::memory::MemoryNotificationStore,
            NotificationService, NotificationStore,
        },
        state::Config,
        websocket::NotificationHub,
    };
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;
    use uuid::Uuid;

    const SECRET: &str = "router-test-secret";

    fn app(store: Arc<MemoryNotificationStore>) -> Router {
        let (hub, runner) = NotificationHub::new();
        tokio::spawn(runner.run(CancellationToken::new()));
        create_router(AppState {
            config: Arc::new(Config::for_tests(SECRET)),
            notification_service: NotificationService::new(store),
            hub,
        })
    }

    async fn seed(store: &MemoryNotificationStore, user_id: Uuid) -> Notification {
        store
            .create(&NewNotification {
                user_id,
                task_id: Some(Uuid::new_v4()),
                notification_type: TASK_DEADLINE.to_string(),
                message: "Task \"Ship it\" is due soon (due: 14:30 UTC)".to_string(),
                dedup_key: None,
            })
            .await
            .unwrap()
            .unwrap()
    }

    fn authed(method: &str, uri: &str, user_id: Uuid) -> Request<Body> {
        let token = create_access_token(user_id, SECRET);
        Request::builder()
            .method(method)
            .uri(uri)
            .header("Authorization", format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app(Arc::default())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({ "status": "ok", "connections": 0 })
        );
    }

    #[tokio::test]
    async fn test_notifications_require_token() {
        let response = app(Arc::default())
            .oneshot(
                Request::get("/api/notifications")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_list_returns_only_callers_notifications() {
        let store = Arc::new(MemoryNotificationStore::default());
        let owner = Uuid::new_v4();
        let mine = seed(&store, owner).await;
        seed(&store, Uuid::new_v4()).await;

        let response = app(store)
            .oneshot(authed("GET", "/api/notifications?page=0", owner))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        let items = body.as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["id"], json!(mine.id));
        assert_eq!(items[0]["type"], json!(TASK_DEADLINE));
        assert_eq!(items[0]["is_read"], json!(false));
    }

    #[tokio::test]
    async fn test_mark_read_is_owner_scoped() {
        let store = Arc::new(MemoryNotificationStore::default());
        let owner = Uuid::new_v4();
        let notification = seed(&store, owner).await;
        let uri = format!("/api/notifications/{}/read", notification.id);

        let response = app(store.clone())
            .oneshot(authed("PATCH", &uri, Uuid::new_v4()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app(store)
            .oneshot(authed("PATCH", &uri, owner))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["is_read"], json!(true));
    }
}
