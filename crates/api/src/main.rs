use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method, StatusCode};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use darkroom_api::config::ServerConfig;
use darkroom_api::notifications::NotificationRouter;
use darkroom_api::{routes, state, ws};
use darkroom_pipeline::{PgJobStore, PipelineConfig, WorkerPool};
use darkroom_queue::{JobQueue, MemoryJobQueue, RedisJobQueue};
use darkroom_thumbnail::ImageThumbnailer;

use state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "darkroom_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = darkroom_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    darkroom_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    darkroom_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Storage ---
    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .expect("Failed to create upload directory");

    // --- Job queue ---
    let queue: Arc<dyn JobQueue> = if config.queue_url == "memory" {
        tracing::warn!("Using the in-process job queue; jobs will not survive a restart");
        Arc::new(MemoryJobQueue::new())
    } else {
        Arc::new(
            RedisJobQueue::connect(&config.queue_url, config.queue_name.clone())
                .await
                .expect("Failed to connect to the job queue"),
        )
    };
    tracing::info!(queue_name = %config.queue_name, "Job queue ready");

    // --- CORS ---
    let cors = build_cors_layer(&config);

    // --- Event bus ---
    let event_bus = Arc::new(darkroom_events::EventBus::default());
    tracing::info!("Event bus created");

    // --- Notification hub ---
    let (hub, hub_task) = ws::NotificationHub::start();

    // Spawn the notification router (bus events -> WebSocket frames).
    let notification_router = NotificationRouter::new(hub.clone());
    let router_handle = tokio::spawn(notification_router.run(event_bus.subscribe()));
    tracing::info!("Notification services started (hub, router)");

    // --- Worker pool ---
    let mut pipeline_config = PipelineConfig {
        storage_root: config.upload_dir.clone(),
        public_base_url: config.public_base_url.clone(),
        shutdown_timeout: Duration::from_secs(config.shutdown_timeout_secs),
        ..PipelineConfig::default()
    };
    if let Some(worker_count) = config.worker_count {
        pipeline_config.worker_count = worker_count;
    }

    let worker_pool = WorkerPool::start(
        pipeline_config,
        Arc::clone(&queue),
        Arc::new(PgJobStore::new(pool.clone())),
        Arc::new(ImageThumbnailer::new(config.upload_dir.clone())),
        Arc::clone(&event_bus),
    );

    // --- App state ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        hub: hub.clone(),
        queue,
        event_bus: Arc::clone(&event_bus),
        worker_stats: worker_pool.stats(),
    };

    // --- Request ID header name ---
    let request_id_header = HeaderName::from_static("x-request-id");

    // --- Router ---
    let app = Router::new()
        // Health check at root level (not under /api/v1).
        .merge(routes::health::router())
        // API v1 routes.
        .nest("/api/v1", routes::api_routes())
        // Stored originals and thumbnails.
        .nest_service("/static", ServeDir::new(&config.upload_dir))
        // -- Middleware stack (applied bottom-up) --
        // Panic recovery: catch panics and return 500 JSON.
        .layer(CatchPanicLayer::new())
        // Request timeout.
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs),
        ))
        // Propagate request ID to response.
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        // Structured request/response tracing.
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Set request ID on incoming requests.
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        // CORS.
        .layer(cors)
        // Shared state.
        .with_state(state);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    let join_timeout = Duration::from_secs(config.shutdown_timeout_secs);

    // Let in-flight jobs finish before their event consumers go away.
    // The pool bounds this join with its configured shutdown deadline.
    worker_pool.shutdown().await;

    // Drop the event bus sender to close the broadcast channel. This
    // signals the notification router to shut down.
    drop(event_bus);
    let _ = tokio::time::timeout(join_timeout, router_handle).await;
    tracing::info!("Notification router stopped");

    // Close remaining WebSocket connections and stop the hub.
    hub.shutdown().await;
    let _ = tokio::time::timeout(join_timeout, hub_task).await;

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager (e.g. systemd, Docker, Kubernetes).
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

/// Build the CORS middleware layer from server configuration.
///
/// Panics at startup if any configured origin is invalid, which is the
/// desired behaviour -- we want misconfiguration to fail fast.
fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<_> = config
        .cors_origins
        .iter()
        .map(|o| {
            o.parse()
                .unwrap_or_else(|e| panic!("Invalid CORS origin '{o}': {e}"))
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}
