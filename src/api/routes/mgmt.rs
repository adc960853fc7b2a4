//! Management Routes
//!
//! - GET /mgmt/ping - Liveness probe
//! - GET /mgmt/health - Cache and backend status
//! - GET /mgmt/config - Running configuration as TOML
//! - GET /mgmt/extents - Cached coverage of one series
//! - DELETE /mgmt/purge/key/:key - Drop one cached series

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use std::time::Duration;

use crate::api::dto::{ExtentDto, ExtentsResponse, HealthResponse, PurgeResponse, SeriesParams};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::timeseries::{parse_duration, Extent, TimeRangeQuery};

const HEALTH_PROBE_KEY: &str = "deltacache.health.probe";

/// GET /mgmt/ping
pub async fn ping() -> &'static str {
    "pong"
}

/// GET /mgmt/health
///
/// Round-trips a probe object through the cache engine.
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let cache_ok = check_cache_health(&state).await;

    let (status, overall) = if cache_ok {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        status,
        Json(HealthResponse {
            status: overall.to_string(),
            cache: if cache_ok { "ok" } else { "error" }.to_string(),
            cache_engine: state.cache.name().to_string(),
            backend: state.config.backend.name.clone(),
            uptime_seconds: state.uptime_seconds(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

async fn check_cache_health(state: &AppState) -> bool {
    let cache = &state.cache;
    if let Err(e) = cache
        .store(HEALTH_PROBE_KEY, b"ok".to_vec(), Duration::from_secs(60))
        .await
    {
        tracing::warn!(error = %e, "cache health probe store failed");
        return false;
    }
    match cache.retrieve(HEALTH_PROBE_KEY).await {
        Ok(value) => value == b"ok",
        Err(e) => {
            tracing::warn!(error = %e, "cache health probe retrieve failed");
            false
        }
    }
}

/// GET /mgmt/config
pub async fn config(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let body = state.config.to_toml()?;
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body))
}

/// GET /mgmt/extents?query=&step=
pub async fn extents(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SeriesParams>,
) -> ApiResult<Json<ExtentsResponse>> {
    let step = parse_duration(&params.step)?;
    let key = TimeRangeQuery::new(params.query, Extent::default(), step).cache_key();

    let extents = state
        .proxy
        .extents(&key)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no cached series for key '{}'", key)))?;

    Ok(Json(ExtentsResponse {
        coverage: extents.to_string(),
        extents: extents.iter().map(ExtentDto::with_recency).collect(),
        key,
    }))
}

/// DELETE /mgmt/purge/key/:key
pub async fn purge_key(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> ApiResult<Json<PurgeResponse>> {
    state.proxy.purge(&key).await?;
    Ok(Json(PurgeResponse {
        status: "purged".to_string(),
        key,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ping() {
        assert_eq!(ping().await, "pong");
    }
}
