// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// Endpoints:
//   GET /api/health                          — gateway counters
//   GET /api/market-data?ticker=&period=     — reshaped historical candles
//   GET /api/symbol-search?q=                — filtered symbol lookup
//   GET /ws/ticks/{symbol}                   — real-time WebSocket feed
//
// CORS is permissive: the chart frontend is served from another origin.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, Query, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info};

use crate::api::error::ApiError;
use crate::app_state::AppState;
use crate::market_data::{reshape, ChartRecord};
use crate::types::{normalize_symbol, Period};
use crate::upstream::{filter_listings, RangeSpec};

/// Shorter search queries are answered locally with an empty result.
pub const MIN_SEARCH_QUERY_CHARS: usize = 2;

// =============================================================================
// Router construction
// =============================================================================

/// Build the full router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health))
        .route("/api/market-data", get(market_data))
        .route("/api/symbol-search", get(symbol_search))
        // ── WebSocket ──────────────────────────────────────────────────
        .route("/ws/ticks/:symbol", get(crate::api::ws::ticker_ws_handler))
        .route("/ws/ticks/:symbol/", get(crate::api::ws::ticker_ws_handler))
        // ── Middleware & State ─────────────────────────────────────────
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health
// =============================================================================

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.health())
}

// =============================================================================
// Historical market data
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct MarketDataQuery {
    ticker: Option<String>,
    period: Option<String>,
}

async fn market_data(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MarketDataQuery>,
) -> Result<Json<Vec<ChartRecord>>, ApiError> {
    let ticker = query
        .ticker
        .as_deref()
        .map(normalize_symbol)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| normalize_symbol(&state.config.default_ticker));
    let period = Period::parse(query.period.as_deref().unwrap_or_default());

    let history = state
        .market_data
        .fetch(&ticker, RangeSpec::for_period(period))
        .await?;

    if history.bars.is_empty() {
        info!(ticker = %ticker, period = %period, "no historical data");
        return Err(ApiError::NoData { ticker });
    }

    let records = reshape(period, &history);
    debug!(
        ticker = %ticker,
        period = %period,
        bars = history.bars.len(),
        records = records.len(),
        "market data served"
    );
    Ok(Json(records))
}

// =============================================================================
// Symbol search
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    q: Option<String>,
}

async fn symbol_search(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let q = query.q.unwrap_or_default();
    if q.chars().count() < MIN_SEARCH_QUERY_CHARS {
        return Ok(Json(serde_json::json!({ "result": [] })));
    }

    let listings = filter_listings(state.directory.search(&q).await?);
    debug!(query = %q, count = listings.len(), "symbol search served");

    Ok(Json(serde_json::json!({
        "count": listings.len(),
        "result": listings,
    })))
}
