//! DNB Knowledge Base Server - Main entry point

use anyhow::Result;
use axum::{routing::get, Router};
use dnbkb_common::logging::{init_logging, LogConfig};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{signal, task::JoinHandle};
use tower_http::compression::CompressionLayer;
use tracing::{info, warn};

use dnbkb_server::{
    catalog::SruClient,
    config::Config,
    db::{self, CatalogStore, PgCatalogStore},
    features::{self, AppState},
    ingest::{
        AssetDispatcher, AssetWorker, Downloader, JobScheduler, LocalDispatcher,
        PostgresDispatcher, QueueBackend,
    },
    middleware,
    storage::{ObjectStore, S3Storage},
};

#[tokio::main]
async fn main() -> Result<()> {
    let log_config = LogConfig::from_env()?.with_file_prefix("dnbkb-server");
    let log_config = if std::env::var("LOG_FILTER").is_ok() {
        log_config
    } else {
        log_config
            .with_filter_directives("dnbkb_server=debug,tower_http=debug,sqlx=info,apalis=info")
    };

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = init_logging(&log_config)?;

    info!("Starting DNB knowledge base server");

    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    let pool = db::create_pool(&config.database).await?;
    info!("Database connection pool established");

    db::run_migrations(&pool).await?;
    info!("Database migrations completed");

    let storage = S3Storage::new(config.storage.clone());
    if let Err(e) = storage.ensure_bucket().await {
        warn!("Object storage bucket check failed, uploads may fail: {}", e);
    }

    let store: Arc<dyn CatalogStore> = Arc::new(PgCatalogStore::new(pool.clone()));
    let objects: Arc<dyn ObjectStore> = Arc::new(storage);

    let downloader = Downloader::new(&config.ingest, objects.clone())?;
    let worker = AssetWorker::new(store.clone(), Arc::new(downloader));

    let (dispatcher, _worker_handle): (Arc<dyn AssetDispatcher>, Option<JoinHandle<()>>) =
        match config.ingest.queue {
            QueueBackend::Local => {
                info!(
                    "Using in-process asset queue with {} concurrent downloads",
                    config.ingest.worker_concurrency
                );
                let (dispatcher, handle) =
                    LocalDispatcher::spawn(worker, config.ingest.worker_concurrency);
                (Arc::new(dispatcher), Some(handle))
            },
            QueueBackend::Postgres => {
                let handle = if config.ingest.worker_enabled {
                    let scheduler = JobScheduler::new(config.ingest.clone(), pool.clone(), worker);
                    Some(scheduler.start().await?)
                } else {
                    info!("Asset worker is disabled (INGEST_WORKER_ENABLED=false)");
                    None
                };
                (Arc::new(PostgresDispatcher::new(&pool)), handle)
            },
        };

    let sru = SruClient::new(&config.catalog)?;
    let state = AppState::new(store, objects, sru, dispatcher)
        .with_presign_expiry(config.ingest.presign_expiry())
        .with_max_page_size(config.catalog.max_page_size);

    let app = create_router(state, &config);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(config.server.shutdown_timeout_secs))
        .await?;

    info!("Server shut down gracefully");

    Ok(())
}

/// Create the application router with all routes and middleware
fn create_router(state: AppState, config: &Config) -> Router {
    Router::new()
        .route("/health", get(features::health_check))
        .with_state(state.clone())
        .nest("/api/v1", features::router(state))
        // Apply layers from innermost to outermost
        .layer(CompressionLayer::new())
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(&config.cors))
}

/// Graceful shutdown signal handler
async fn shutdown_signal(timeout_secs: u64) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }

    info!("Waiting up to {} seconds for connections to close", timeout_secs);
    tokio::time::sleep(Duration::from_secs(timeout_secs.min(5))).await;
}
