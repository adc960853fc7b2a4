//! Query Routes
//!
//! - GET /api/v1/query_range - Range query through the delta proxy cache

use axum::{
    extract::{Query, State},
    http::{header::HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use crate::api::dto::{cache_status_header, ExtentDto, PointDto, RangeQueryParams, RangeQueryResponse};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::timeseries::{
    apply_directives, parse_duration, parse_epoch, Extent, RequestOptions, TimeRangeQuery,
};

pub const CACHE_STATUS_HEADER: &str = "x-cache-status";

/// GET /api/v1/query_range
///
/// Answer a range query, fetching only what the cache lacks.
pub async fn query_range(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RangeQueryParams>,
) -> ApiResult<Response> {
    let (trq, ro) = parse_range_query(&params)?;

    let timeout = state.request_timeout();
    let resp = tokio::time::timeout(timeout, state.proxy.fetch_timeseries(trq, ro))
        .await
        .map_err(|_| ApiError::Timeout(timeout.as_secs()))??;

    let header = cache_status_header(resp.status, &resp.fetched);
    let body = RangeQueryResponse {
        status: resp.status.to_string(),
        extent: ExtentDto::range(&resp.extent),
        points: resp.points.iter().map(PointDto::from).collect(),
        fetched: resp.fetched.iter().map(ExtentDto::range).collect(),
    };

    let mut response = (StatusCode::OK, Json(body)).into_response();
    let value = HeaderValue::from_str(&header)
        .map_err(|e| ApiError::Internal(format!("invalid cache status header: {}", e)))?;
    response
        .headers_mut()
        .insert(HeaderName::from_static(CACHE_STATUS_HEADER), value);
    Ok(response)
}

/// Build the time range query and request options from query parameters
pub fn parse_range_query(params: &RangeQueryParams) -> ApiResult<(TimeRangeQuery, RequestOptions)> {
    if params.query.trim().is_empty() {
        return Err(ApiError::Validation("query cannot be empty".to_string()));
    }

    let (start, _) = parse_epoch(params.start.trim())?;
    let (end, _) = parse_epoch(params.end.trim())?;
    if end < start {
        return Err(ApiError::Validation(format!(
            "end ({}) precedes start ({})",
            params.end, params.start
        )));
    }

    let step = parse_duration(&params.step)?;
    if step <= chrono::Duration::zero() {
        return Err(ApiError::Validation("step must be positive".to_string()));
    }

    let mut trq = TimeRangeQuery::new(params.query.clone(), Extent::new(start, end), step);
    let mut ro = RequestOptions::default();
    apply_directives(&params.query, &mut trq, &mut ro)?;
    Ok((trq, ro))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn params(query: &str, start: &str, end: &str, step: &str) -> RangeQueryParams {
        RangeQueryParams {
            query: query.to_string(),
            start: start.to_string(),
            end: end.to_string(),
            step: step.to_string(),
        }
    }

    #[test]
    fn test_parse_range_query() {
        let (trq, ro) = parse_range_query(&params(
            "SELECT avg(v) FROM cpu /* deltacache-fast-forward: off */ -- deltacache-backfill-tolerance: 5pts",
            "2020-01-01",
            "1577840400000",
            "1m",
        ))
        .unwrap();
        assert_eq!(trq.extent, Extent::from_secs(1_577_836_800, 1_577_840_400));
        assert_eq!(trq.step, Duration::seconds(60));
        assert_eq!(trq.backfill_tolerance_points, 5);
        assert!(ro.fast_forward_disable);
    }

    #[test]
    fn test_parse_range_query_rejects() {
        assert!(matches!(
            parse_range_query(&params(" ", "1577836800", "1577840400", "60")),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            parse_range_query(&params("up", "yesterday", "1577840400", "60")),
            Err(ApiError::Parse(_))
        ));
        assert!(matches!(
            parse_range_query(&params("up", "1577840400", "1577836800", "60")),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            parse_range_query(&params("up", "1577836800", "1577840400", "0")),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            parse_range_query(&params(
                "up -- deltacache-backfill-tolerance: soon",
                "1577836800",
                "1577840400",
                "60"
            )),
            Err(ApiError::Parse(_))
        ));
    }
}
