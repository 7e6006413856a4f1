mod auth;
mod broadcast;
mod db;
mod error;
mod middleware;
mod notification;
mod queue;
mod routes;
mod services;
mod state;
mod task;
mod websocket;

use broadcast::{run_subscriber, Broadcaster, MemoryBroadcaster, RedisBroadcaster};
use db::{create_pool, run_migrations};
use notification::{NotificationRepository, NotificationService, NotificationStore};
use queue::{JobQueue, MemoryJobQueue, PgJobQueue};
use routes::create_router;
use services::{DeadlineWatcher, NotificationWorker};
use state::{AppState, Config, QueueBackend};
use std::{sync::Arc, time::Duration};
use task::TaskRepository;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use websocket::NotificationHub;

const SUBSCRIBER_RETRY_BACKOFF: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,deadline_notifier=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(Config::from_env()?);

    tracing::info!("Connecting to database...");
    let db = create_pool(&config.database_url).await?;

    tracing::info!("Running migrations...");
    run_migrations(&db).await?;

    let queue: Arc<dyn JobQueue> = match config.queue_backend {
        QueueBackend::Postgres => {
            Arc::new(PgJobQueue::new(db.clone(), config.queue_visibility_timeout))
        }
        QueueBackend::Memory => Arc::new(MemoryJobQueue::new(config.queue_visibility_timeout)),
    };
    tracing::info!(backend = ?config.queue_backend, "Job queue ready");

    let bus: Arc<dyn Broadcaster> = match &config.redis_url {
        Some(url) => Arc::new(RedisBroadcaster::connect(url).await?),
        None => {
            tracing::info!("REDIS_URL not set; fan-out limited to this instance");
            Arc::new(MemoryBroadcaster::new())
        }
    };

    let tasks = Arc::new(TaskRepository::new(db.clone()));
    let notifications: Arc<dyn NotificationStore> =
        Arc::new(NotificationRepository::new(db.clone()));

    let token = CancellationToken::new();
    let (hub, hub_runner) = NotificationHub::with_write_timeout(config.hub_write_timeout);

    // Background pipeline
    let background = vec![
        tokio::spawn(hub_runner.run(token.clone())),
        tokio::spawn(run_subscriber(
            bus.clone(),
            config.notification_channel.clone(),
            hub.clone(),
            SUBSCRIBER_RETRY_BACKOFF,
            token.clone(),
        )),
        tokio::spawn(
            DeadlineWatcher::new(tasks, queue.clone(), config.watcher.clone()).run(token.clone()),
        ),
        tokio::spawn(
            NotificationWorker::new(
                queue,
                notifications.clone(),
                bus,
                config.notification_channel.clone(),
                config.worker.clone(),
            )
            .run(token.clone()),
        ),
    ];

    let state = AppState {
        config: config.clone(),
        notification_service: NotificationService::new(notifications),
        hub,
    };

    let app = create_router(state);

    let addr = config.listen_addr();
    tracing::info!("Server starting on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(token.clone()))
        .await?;

    token.cancel();
    for handle in background {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Background task panicked");
        }
    }
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal(token: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
    token.cancel();
}
