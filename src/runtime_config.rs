// =============================================================================
// Gateway Configuration — JSON file plus environment overrides
// =============================================================================
//
// Every tunable of the gateway lives here: listen address, per-sink queue
// limits, the tick sources to run and upstream endpoints.  All fields carry
// serde defaults so a partial (or empty) JSON file loads cleanly.
//
// The symbol-search API token is only ever read from the environment and is
// never serialised.
//
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::fanout::OverflowPolicy;
use crate::types::{normalize_symbol, Period};

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_ticker() -> String {
    "SPY".to_string()
}

fn default_sink_queue_capacity() -> usize {
    256
}

fn default_tick_sources() -> Vec<TickSourceConfig> {
    vec![TickSourceConfig::random_walk("AAPL")]
}

fn default_start_price() -> f64 {
    150.0
}

fn default_candle_interval_secs() -> u64 {
    60
}

fn default_min_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    2_000
}

fn default_speed() -> f64 {
    1.0
}

fn default_backoff_initial_ms() -> u64 {
    1_000
}

fn default_backoff_max_ms() -> u64 {
    60_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_backoff_jitter() -> f64 {
    0.1
}

fn default_chart_base_url() -> String {
    "https://query1.finance.yahoo.com".to_string()
}

fn default_search_base_url() -> String {
    "https://finnhub.io".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

// =============================================================================
// Tick sources
// =============================================================================

/// Delay between two emissions of a tick source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingConfig {
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Playback speed; the sampled delay is divided by it.
    #[serde(default = "default_speed")]
    pub speed: f64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            speed: default_speed(),
        }
    }
}

/// What a tick source produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TickSourceKind {
    /// Bounded random walk emitting `{time, close}`.
    RandomWalk {
        #[serde(default = "default_start_price")]
        start_price: f64,
    },
    /// Replays historical bars for the symbol, refetching when exhausted.
    Replay {
        #[serde(default)]
        period: Period,
        /// Fractional close jitter (0.001 = ±0.1 %); 0 disables it.
        #[serde(default)]
        close_jitter: f64,
    },
    /// Random-walk prices folded into a forming candle.
    PartialCandle {
        #[serde(default = "default_start_price")]
        start_price: f64,
        #[serde(default = "default_candle_interval_secs")]
        interval_secs: u64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickSourceConfig {
    pub symbol: String,

    pub source: TickSourceKind,

    #[serde(default)]
    pub pacing: PacingConfig,
}

impl TickSourceConfig {
    pub fn random_walk(symbol: &str) -> Self {
        Self {
            symbol: normalize_symbol(symbol),
            source: TickSourceKind::RandomWalk {
                start_price: default_start_price(),
            },
            pacing: PacingConfig::default(),
        }
    }
}

// =============================================================================
// Backoff & upstream
// =============================================================================

/// Retry policy for tick sources whose upstream fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    #[serde(default = "default_backoff_initial_ms")]
    pub initial_ms: u64,

    #[serde(default = "default_backoff_max_ms")]
    pub max_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub multiplier: f64,

    /// Random ± fraction applied to each delay.
    #[serde(default = "default_backoff_jitter")]
    pub jitter_factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_ms: default_backoff_initial_ms(),
            max_ms: default_backoff_max_ms(),
            multiplier: default_backoff_multiplier(),
            jitter_factor: default_backoff_jitter(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_chart_base_url")]
    pub chart_base_url: String,

    #[serde(default = "default_search_base_url")]
    pub search_base_url: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Symbol-search API token, from `FINNHUB_API_TOKEN` only.
    #[serde(skip)]
    pub search_api_token: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            chart_base_url: default_chart_base_url(),
            search_base_url: default_search_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            search_api_token: String::new(),
        }
    }
}

// =============================================================================
// GatewayConfig
// =============================================================================

/// Top-level configuration of the ticker gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Ticker used by `/api/market-data` when none is given.
    #[serde(default = "default_ticker")]
    pub default_ticker: String,

    // --- Per-subscriber backpressure -----------------------------------------

    #[serde(default = "default_sink_queue_capacity")]
    pub sink_queue_capacity: usize,

    #[serde(default)]
    pub overflow_policy: OverflowPolicy,

    // --- Producers ----------------------------------------------------------

    #[serde(default = "default_tick_sources")]
    pub tick_sources: Vec<TickSourceConfig>,

    #[serde(default)]
    pub backoff: BackoffConfig,

    #[serde(default)]
    pub upstream: UpstreamConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            default_ticker: default_ticker(),
            sink_queue_capacity: default_sink_queue_capacity(),
            overflow_policy: OverflowPolicy::default(),
            tick_sources: default_tick_sources(),
            backoff: BackoffConfig::default(),
            upstream: UpstreamConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read gateway config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse gateway config from {}", path.display()))?;

        info!(
            path = %path.display(),
            bind_addr = %config.bind_addr,
            tick_sources = config.tick_sources.len(),
            overflow_policy = %config.overflow_policy,
            "gateway config loaded"
        );

        Ok(config)
    }

    /// Apply `GATEWAY_BIND_ADDR`, `GATEWAY_SYMBOLS` and `FINNHUB_API_TOKEN`.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(addr) = lookup("GATEWAY_BIND_ADDR").filter(|v| !v.trim().is_empty()) {
            self.bind_addr = addr.trim().to_string();
        }

        // A symbol list replaces the configured sources with one random walk
        // per symbol.
        if let Some(symbols) = lookup("GATEWAY_SYMBOLS") {
            let sources: Vec<TickSourceConfig> = symbols
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(TickSourceConfig::random_walk)
                .collect();
            if !sources.is_empty() {
                self.tick_sources = sources;
            }
        }

        if let Some(token) = lookup("FINNHUB_API_TOKEN") {
            self.upstream.search_api_token = token.trim().to_string();
        }
    }
}
