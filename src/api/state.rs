//! Application State
//!
//! Shared state accessible by all API handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use crate::cache::Cache;
use crate::config::Config;
use crate::deltaproxy::DeltaProxyCache;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Delta proxy for the configured backend
    pub proxy: Arc<DeltaProxyCache>,
    /// Cache engine behind the proxy, for health probes
    pub cache: Arc<dyn Cache>,
    /// Running configuration
    pub config: Arc<Config>,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    pub fn new(proxy: Arc<DeltaProxyCache>, cache: Arc<dyn Cache>, config: Config) -> Self {
        Self {
            proxy,
            cache,
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Upper bound on a single proxied request
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.config.proxy.request_timeout_secs.max(1))
    }

    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.config.proxy.host, self.config.proxy.port)
    }
}
