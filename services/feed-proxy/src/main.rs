//! Instagram Feed Proxy
//!
//! Single-binary Rust service that:
//! 1. Loads the Instagram token (persisted record, else CLIENT_TOKEN)
//! 2. Keeps the token renewed on a background schedule
//! 3. Serves the latest posts to the website gallery, cached for 10 minutes
//! 4. Falls back to the last good listing when the Graph API fails

mod cache;
mod config;
mod error;
mod metrics;
mod proxy;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::{Query, State};
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use instagram_auth::{CredentialStore, TokenRefresher, spawn_refresh_task};
use instagram_graph::GraphClient;
use serde::Deserialize;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use metrics_exporter_prometheus::PrometheusHandle;

use crate::cache::{CACHE_TTL, ResultCache};
use crate::config::{Config, DEFAULT_CONFIG_PATH, ServerConfig};
use crate::proxy::ProxyState;

/// Time allowed for in-flight requests to finish after a shutdown signal
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    proxy: ProxyState,
    prometheus: PrometheusHandle,
}

/// Query of `GET /api/instagram`. Only `refresh=true` forces a fetch.
#[derive(Debug, Default, Deserialize)]
struct FeedQuery {
    refresh: Option<String>,
}

/// Build the axum router with all routes and shared state.
fn build_router(state: AppState, max_connections: usize, cors: CorsLayer) -> Router {
    Router::new()
        .route("/api/instagram", get(feed_handler))
        .route("/api/instagram/clear-cache", post(clear_cache_handler))
        .route("/api/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(cors)
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

/// CORS for the website frontend. No configured origins means any origin.
fn build_cors_layer(server: &ServerConfig) -> CorsLayer {
    if server.cors_allowed_origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = server
        .cors_allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin = %origin, error = %e, "skipping invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting instagram-feed-proxy");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle = metrics::install_recorder();

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config = match Config::resolve_path(cli_config_path) {
        Some(path) => {
            info!(path = %path.display(), "loading configuration");
            Config::load(&path)
                .with_context(|| format!("failed to load config from {}", path.display()))?
        }
        None => Config::load_or_default(Path::new(DEFAULT_CONFIG_PATH))
            .with_context(|| format!("failed to load config from {DEFAULT_CONFIG_PATH}"))?,
    };

    info!(
        listen_addr = %config.listen_addr(),
        graph_url = %config.instagram.graph_url,
        token_path = %config.instagram.token_path.display(),
        refresh_interval_days = config.instagram.refresh_interval_days,
        post_limit = config.instagram.post_limit,
        "configuration loaded"
    );

    let fallback_token = config
        .instagram
        .client_token
        .as_ref()
        .map(|t| t.expose().as_str());
    let credentials = Arc::new(
        CredentialStore::load(config.instagram.token_path.clone(), fallback_token)
            .await
            .context("no Instagram token available, set CLIENT_TOKEN")?,
    );

    let http_client = reqwest::Client::new();

    // First tick runs immediately: verifies the token at startup
    let refresher = Arc::new(TokenRefresher::new(
        credentials.clone(),
        http_client.clone(),
        config.instagram.graph_url.clone(),
        config.instagram.refresh_interval_days,
    ));
    let refresh_task = spawn_refresh_task(refresher.clone(), refresher.period());

    let app_state = AppState {
        proxy: ProxyState {
            graph: GraphClient::new(http_client, config.instagram.graph_url.clone()),
            credentials,
            cache: Arc::new(ResultCache::new(CACHE_TTL)),
            post_limit: config.instagram.post_limit,
        },
        prometheus: prometheus_handle,
    };

    let app = build_router(
        app_state,
        config.server.max_connections,
        build_cors_layer(&config.server),
    );

    let listen_addr = config.listen_addr();
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;

    let base_url = config.base_url();
    info!(
        addr = %listen_addr,
        feed = %format!("{base_url}/api/instagram"),
        health = %format!("{base_url}/api/health"),
        clear_cache = %format!("POST {base_url}/api/instagram/clear-cache"),
        "accepting requests"
    );

    // Graceful shutdown: the drain timeout starts when the signal fires
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;

    refresh_task.abort();
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            warn!(
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    info!("shutdown complete");
    Ok(())
}

/// GET /api/instagram: latest posts, cached unless `refresh=true`.
async fn feed_handler(State(state): State<AppState>, Query(query): Query<FeedQuery>) -> Response {
    let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
    let force = query.refresh.as_deref() == Some("true");
    match proxy::fetch_feed(&state.proxy, force, request_id).await {
        Ok(feed) => axum::Json(feed).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /api/instagram/clear-cache: drop the cached listing.
async fn clear_cache_handler(State(state): State<AppState>) -> impl IntoResponse {
    proxy::clear_cache(&state.proxy).await;
    axum::Json(serde_json::json!({ "message": "Cache cleared successfully" }))
}

/// GET /api/health: cache and token status.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(proxy::health(&state.proxy).await)
}

/// Prometheus metrics endpoint, returns metrics in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
