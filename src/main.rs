// =============================================================================
// Ticker Gateway — Main Entry Point
// =============================================================================
//
// Starts every configured tick source, then serves the REST and WebSocket
// API until Ctrl+C.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod fanout;
mod market_data;
mod runtime_config;
mod tick_source;
mod types;
mod upstream;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::runtime_config::GatewayConfig;
use crate::tick_source::Backoff;
use crate::upstream::{FinnhubDirectory, YahooChartClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Ticker Gateway — Starting Up                     ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let config_path =
        std::env::var("GATEWAY_CONFIG").unwrap_or_else(|_| "gateway_config.json".into());
    let mut config = GatewayConfig::load(&config_path).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        GatewayConfig::default()
    });
    config.apply_env_overrides();

    if config.upstream.search_api_token.is_empty() {
        warn!("FINNHUB_API_TOKEN not set; symbol search requests will be rejected upstream");
    }

    // ── 2. Upstream clients ──────────────────────────────────────────────
    let timeout = Duration::from_secs(config.upstream.request_timeout_secs);
    let market_data = Arc::new(YahooChartClient::new(
        config.upstream.chart_base_url.clone(),
        timeout,
    )?);
    let directory = Arc::new(FinnhubDirectory::new(
        config.upstream.search_base_url.clone(),
        &config.upstream.search_api_token,
        timeout,
    )?);

    // ── 3. Build shared state ────────────────────────────────────────────
    let state = Arc::new(AppState::new(config, market_data, directory));

    // ── 4. Spawn tick sources ────────────────────────────────────────────
    for source_cfg in &state.config.tick_sources {
        let source = tick_source::build(source_cfg, state.market_data.clone());
        let backoff = Backoff::new(&state.config.backoff);
        tokio::spawn(tick_source::run_tick_source(
            source,
            state.dispatcher.clone(),
            backoff,
        ));
    }
    info!(count = state.config.tick_sources.len(), "Tick sources launched");

    // ── 5. Start the API server ──────────────────────────────────────────
    let bind_addr = state.config.bind_addr.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind API server to {bind_addr}"))?;
    info!(addr = %bind_addr, "API server listening");

    let app = api::router(state.clone());
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "API server failed");
        }
    });

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 6. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received — stopping");

    let health = state.health();
    info!(
        published = health.published,
        delivered = health.delivered,
        subscribers = health.subscribers,
        "Ticker Gateway shut down complete."
    );
    Ok(())
}
