//! deltacache HTTP API
//!
//! HTTP front of the delta proxy cache, built with Axum.
//!
//! # Endpoints
//!
//! ## Query
//! - `GET /api/v1/query_range?query=&start=&end=&step=` - Range query through the cache
//!
//! ## Management
//! - `GET /mgmt/ping` - Liveness probe
//! - `GET /mgmt/health` - Cache engine status
//! - `GET /mgmt/config` - Running configuration (TOML)
//! - `GET /mgmt/extents?query=&step=` - Cached coverage of a series
//! - `DELETE /mgmt/purge/key/:key` - Drop a cached series
//!
//! # Example
//!
//! ```rust,ignore
//! use deltacache::api::{serve, AppState};
//! use deltacache::cache::open_cache;
//! use deltacache::config::Config;
//! use deltacache::deltaproxy::{DeltaProxyCache, HttpUpstream, ProxyOptions};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default();
//!     let cache = open_cache(&config.cache)?;
//!     let upstream = Arc::new(HttpUpstream::new(&config.backend.origin_url, config.backend.timeout_ms)?);
//!     let proxy = Arc::new(DeltaProxyCache::new(cache.clone(), upstream, ProxyOptions::from(&config.backend)));
//!
//!     serve(AppState::new(proxy, cache, config)).await?;
//!     Ok(())
//! }
//! ```

pub mod dto;
pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

use axum::{
    routing::{delete, get},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Build the API router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new().route("/query_range", get(routes::query::query_range));

    let mgmt_routes = Router::new()
        .route("/ping", get(routes::mgmt::ping))
        .route("/health", get(routes::mgmt::health))
        .route("/config", get(routes::mgmt::config))
        .route("/extents", get(routes::mgmt::extents))
        .route("/purge/key/:key", delete(routes::mgmt::purge_key));

    let shared_state = Arc::new(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .nest("/mgmt", mgmt_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(shared_state)
}

/// Start the API server
pub async fn serve(state: AppState) -> Result<(), ApiError> {
    let addr = state.addr();
    let cache = Arc::clone(&state.cache);
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("deltacache listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    if let Err(e) = cache.close().await {
        tracing::warn!(error = %e, "cache did not close cleanly");
    }
    tracing::info!("deltacache shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "failed to install SIGTERM handler");
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

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
