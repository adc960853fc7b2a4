//! Upstream time-series backends
//!
//! The delta proxy only needs two things from a backend: the samples of a
//! series over a range, and optionally its current instantaneous value for
//! fast forward. `HttpUpstream` speaks a plain JSON dialect:
//!
//! ```text
//! GET {origin}/api/v1/query_range?query=..&start=<unix s>&end=<unix s>&step=<s>
//! GET {origin}/api/v1/query?query=..
//!
//! → {"points": [[1577836800, 0.5], [1577836860, 0.75]]}
//! ```

use crate::deltaproxy::document::DataPoint;
use crate::deltaproxy::error::{ProxyError, ProxyResult};
use crate::timeseries::{duration_nanos, Epoch, Extent};
use async_trait::async_trait;
use chrono::Duration;
use reqwest::Client;
use serde::Deserialize;

/// A time-series backend the proxy fetches from
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Samples of `statement` within `extent` at `step`
    async fn fetch(
        &self,
        statement: &str,
        extent: &Extent,
        step: Duration,
    ) -> ProxyResult<Vec<DataPoint>>;

    /// Current value of `statement`, if the backend supports instant queries
    async fn fetch_instant(&self, _statement: &str) -> ProxyResult<Option<DataPoint>> {
        Ok(None)
    }
}

/// Wire shape of the JSON dialect
#[derive(Debug, Deserialize)]
struct PointsResponse {
    /// `[unix seconds, value]` pairs; millisecond precision is kept
    #[serde(default)]
    points: Vec<(f64, f64)>,
}

impl PointsResponse {
    fn into_points(self) -> Vec<DataPoint> {
        self.points
            .into_iter()
            .map(|(ts, value)| DataPoint::new(Epoch::from_millis((ts * 1000.0).round() as i64), value))
            .collect()
    }
}

/// HTTP backend speaking the JSON points dialect
pub struct HttpUpstream {
    client: Client,
    origin_url: String,
}

impl HttpUpstream {
    pub fn new(origin_url: &str, timeout_ms: u64) -> ProxyResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .build()?;

        Ok(Self {
            client,
            origin_url: origin_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn origin_url(&self) -> &str {
        &self.origin_url
    }

    async fn get_points(&self, url: &str, query: &[(&str, String)]) -> ProxyResult<Vec<DataPoint>> {
        let response = self.client.get(url).query(query).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProxyError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        let body: PointsResponse = response.json().await?;
        Ok(body.into_points())
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn fetch(
        &self,
        statement: &str,
        extent: &Extent,
        step: Duration,
    ) -> ProxyResult<Vec<DataPoint>> {
        let url = format!("{}/api/v1/query_range", self.origin_url);
        let step_secs = duration_nanos(step) as f64 / 1_000_000_000.0;

        tracing::debug!(extent = %extent, step_secs, "upstream range fetch");
        self.get_points(
            &url,
            &[
                ("query", statement.to_string()),
                ("start", extent.start.unix_secs().to_string()),
                ("end", extent.end.unix_secs().to_string()),
                ("step", step_secs.to_string()),
            ],
        )
        .await
    }

    async fn fetch_instant(&self, statement: &str) -> ProxyResult<Option<DataPoint>> {
        let url = format!("{}/api/v1/query", self.origin_url);
        let points = self
            .get_points(&url, &[("query", statement.to_string())])
            .await?;
        Ok(points.last().copied())
    }
}
