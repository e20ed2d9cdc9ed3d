use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use showcase_events::delivery::templates::BasicTemplateRenderer;
use showcase_events::{
    CreationReconciler, DeliveryDispatcher, DigestScheduler, EmailConfig, EmailGateway, LoggingGateway, NotificationQueue,
    NotificationWorkers, PgDiscussionStore, PgNotificationLedger, PgPreferenceLookup, SmtpEmailGateway,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use showcase_worker::config::WorkerConfig;
use showcase_worker::listener::DiscussionListener;
use showcase_worker::router::build_router;
use showcase_worker::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "showcase_worker=debug,showcase_events=debug,tower_http=debug".into()
            }),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(tracing_subscriber::fmt::layer))
        .init();

    // --- Configuration ---
    let config = WorkerConfig::from_env().expect("Invalid worker configuration");
    tracing::info!(
        host = %config.host,
        port = config.port,
        workers = config.queue.workers,
        scheduler_enabled = config.scheduler_enabled,
        "Loaded worker configuration"
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = showcase_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    showcase_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    showcase_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Email gateway ---
    let gateway: Arc<dyn EmailGateway> = match EmailConfig::from_env() {
        Some(email_config) => {
            let gateway = SmtpEmailGateway::new(&email_config, Arc::new(BasicTemplateRenderer))
                .expect("Failed to build SMTP gateway");
            tracing::info!(host = %email_config.smtp_host, "SMTP email delivery enabled");
            Arc::new(gateway)
        }
        None => {
            tracing::warn!("SMTP_HOST not set, emails will be logged instead of sent");
            Arc::new(LoggingGateway)
        }
    };

    // --- Dispatcher ---
    let ledger = Arc::new(PgNotificationLedger::new(pool.clone()));
    let dispatcher = Arc::new(DeliveryDispatcher::new(
        Arc::new(PgDiscussionStore::new(pool.clone())),
        Arc::new(PgPreferenceLookup::new(pool.clone())),
        ledger.clone(),
        gateway,
        config.dispatch.clone(),
    ));

    let cancel = CancellationToken::new();

    // --- Queue workers ---
    let (queue, receiver) = NotificationQueue::from_config(&config.queue);
    let workers = NotificationWorkers::spawn(
        Arc::clone(&dispatcher),
        receiver,
        config.queue.clone(),
        cancel.clone(),
    );

    // --- NOTIFY bridge ---
    let listener = DiscussionListener::connect(&pool)
        .await
        .expect("Failed to subscribe to discussion notifications");
    let listener_handle = tokio::spawn(listener.run(queue.clone(), cancel.clone()));

    // --- Digest scheduler ---
    let scheduler_handle = config.scheduler_enabled.then(|| {
        let scheduler = DigestScheduler::new(Arc::clone(&dispatcher));
        let cancel = cancel.clone();
        tokio::spawn(async move { scheduler.run(cancel).await })
    });

    // --- Creation reconciler ---
    let reconciler = CreationReconciler::new(ledger, queue.clone(), config.reconcile.clone());
    let reconciler_handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { reconciler.run(cancel).await }
    });

    tracing::info!("Notification services started");

    // --- Router ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    let state = AppState {
        pool,
        config: Arc::new(config),
        dispatcher,
        queue,
    };
    let app = build_router(state);

    // --- Start server ---
    tracing::info!(%addr, "Starting server");
    let tcp = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(tcp, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");
    cancel.cancel();

    let _ = tokio::time::timeout(Duration::from_secs(5), listener_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), reconciler_handle).await;
    if let Some(handle) = scheduler_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }
    if tokio::time::timeout(Duration::from_secs(30), workers.join()).await.is_err() {
        tracing::warn!("Notification workers did not drain in time");
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT or SIGTERM to initiate graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
