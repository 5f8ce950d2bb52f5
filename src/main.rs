use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

mod cache;
mod config;
mod dashboard;
mod server;
mod sources;
mod stats;

use crate::cache::ResponseCache;
use crate::config::Config;
use crate::dashboard::{Dashboard, DashboardSettings};
use crate::server::AppState;
use crate::sources::{LastFmClient, RetryingSource};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("scrobble_dash=debug".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();

    info!("🎵 Starting scrobble-dash v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load().context("Failed to load configuration")?;
    info!("{}", config.summary());

    let client = LastFmClient::new(
        config.lastfm_api_url.clone(),
        config.lastfm_api_key.clone(),
        config.lastfm_username.clone(),
        config.upstream_timeout,
        config.max_concurrent_requests,
    )
    .context("Failed to build Last.fm client")?;
    let source = Arc::new(RetryingSource::new(client, config.retry_policy()));

    // Un solo caché compartido por todos los handlers
    let cache = ResponseCache::new();
    let dashboard = Dashboard::new(source, cache.clone(), DashboardSettings::from(&config));

    // Limpieza periódica de entradas expiradas
    let sweep_interval = config.cache_cleanup_interval;
    let sweeper = tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_interval);
        interval.tick().await;
        loop {
            interval.tick().await;
            cache.cleanup_old_entries();
        }
    });
    info!(
        "🧹 Cache sweep every {}",
        humantime::format_duration(sweep_interval)
    );

    let state = Arc::new(AppState {
        dashboard,
        request_deadline: config.request_deadline,
    });

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("⚠️ Shutdown signal received, closing...");
    };

    let (_, server) = server::start_server(
        state,
        &config.host,
        config.port,
        config.static_dir.clone(),
        shutdown,
    )
    .await
    .context("Failed to start HTTP server")?;

    info!("🚀 Dashboard backend ready");
    server.await.context("Server task panicked")?;
    sweeper.abort();

    info!("👋 Bye");
    Ok(())
}
