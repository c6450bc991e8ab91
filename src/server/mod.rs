use crate::albums::{AlbumCache, AlbumService};
use crate::cache;
use crate::config::Config;
use crate::store::{HttpStoreClient, StoreClient, StoreError};
use anyhow::{Context, Result};
use axum::{
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod routes_albums;
pub mod routes_files;

/// Interval for the cache sweep task.
const CACHE_SWEEP_INTERVAL_SECS: u64 = 60;

/// Shared application context, one instance per server process. The cache
/// is injected into the album service; handlers never reach for ambient
/// state.
#[derive(Clone)]
pub struct AppContext {
    pub store: Arc<dyn StoreClient>,
    pub albums: Arc<AlbumService>,
}

impl AppContext {
    pub fn new(store: Arc<dyn StoreClient>, cache: Arc<AlbumCache>) -> Self {
        let albums = Arc::new(AlbumService::new(Arc::clone(&store), cache));
        Self { store, albums }
    }
}

/// Create the Axum router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_check))
        .nest(
            "/api",
            routes_albums::album_routes().merge(routes_files::file_routes()),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

/// Map a store error to an HTTP response, logging enough context to
/// correlate with the upstream call. Not-found stays distinct so clients
/// can render an empty state instead of an error banner.
pub(crate) fn store_error_response(err: StoreError, operation: &str, target: &str) -> Response {
    match err {
        StoreError::NotFound { .. } => {
            tracing::debug!(operation, target, "entry not found");
            (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({"error": "Not found"})),
            )
                .into_response()
        }
        err => {
            tracing::error!(operation, target, error = %err, "store request failed");
            let status = if err.is_transient() {
                StatusCode::BAD_GATEWAY
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            (
                status,
                Json(serde_json::json!({"error": "Upstream store request failed"})),
            )
                .into_response()
        }
    }
}

/// Start the HTTP server
pub async fn start_server(config: Config) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let store: Arc<dyn StoreClient> = Arc::new(
        HttpStoreClient::new(&config.store.base_url, &config.store.api_key)
            .context("Failed to build store HTTP client")?,
    );
    let cache = Arc::new(AlbumCache::new(
        config.cache.max_entries,
        Duration::from_secs(config.cache.ttl_secs),
    ));
    cache::start_cleanup_task(Arc::clone(&cache), CACHE_SWEEP_INTERVAL_SECS);

    let ctx = AppContext::new(store, cache);
    let app = create_router(ctx);

    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
