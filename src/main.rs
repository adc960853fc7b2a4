//! deltacache server
//!
//! Run with: cargo run --bin deltacache -- --config config.toml
//!
//! Without `--config` the default locations are searched (see
//! `Config::load_default`), then `DELTACACHE_*` environment variables apply.
//! `RUST_LOG` takes precedence over the configured log level.

use clap::Parser;
use deltacache::api::{serve, AppState};
use deltacache::cache::open_cache;
use deltacache::config::{Config, LoggingConfig};
use deltacache::deltaproxy::{DeltaProxyCache, HttpUpstream, ProxyOptions};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "deltacache")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Caching reverse proxy for time-series backends")]
struct Args {
    /// Config file (default: search the standard locations)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    config.validate()?;

    init_tracing(&config.logging);
    tracing::info!("Starting deltacache v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        backend = %config.backend.name,
        origin = %config.backend.origin_url,
        "Proxying backend"
    );

    let cache = open_cache(&config.cache)?;
    tracing::info!("Cache engine: {}", cache.name());

    let upstream = Arc::new(HttpUpstream::new(
        &config.backend.origin_url,
        config.backend.timeout_ms,
    )?);
    let options = ProxyOptions::from(&config.backend);
    tracing::debug!(?options, "Delta proxy options");

    let proxy = Arc::new(DeltaProxyCache::new(Arc::clone(&cache), upstream, options));
    serve(AppState::new(proxy, cache, config)).await?;

    tracing::info!("deltacache stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("deltacache={},tower_http=info", logging.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
