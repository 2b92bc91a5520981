// =============================================================================
// Central Application State — Ticker Gateway
// =============================================================================
//
// Ties the subscription registry, the dispatcher and the upstream clients
// together for the HTTP and WebSocket handlers. Every collaborator manages
// its own interior mutability; AppState itself is immutable after start.
// =============================================================================

use std::sync::Arc;

use serde::Serialize;

use crate::fanout::{Dispatcher, OverflowPolicy, SinkHandle, SubscriptionRegistry};
use crate::runtime_config::GatewayConfig;
use crate::upstream::{MarketDataSource, SymbolDirectory};

/// Point-in-time view served by `/api/health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub status: &'static str,
    pub groups: usize,
    pub subscribers: usize,
    pub published: u64,
    pub delivered: u64,
    pub uptime_secs: u64,
}

/// Central application state shared across all async tasks via `Arc<AppState>`.
pub struct AppState {
    pub config: GatewayConfig,

    // ── Fan-out ─────────────────────────────────────────────────────────
    pub dispatcher: Arc<Dispatcher>,

    // ── Upstream ────────────────────────────────────────────────────────
    pub market_data: Arc<dyn MarketDataSource>,
    pub directory: Arc<dyn SymbolDirectory>,

    /// Instant when the gateway was started. Used for uptime calculations.
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(
        config: GatewayConfig,
        market_data: Arc<dyn MarketDataSource>,
        directory: Arc<dyn SymbolDirectory>,
    ) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(Arc::new(SubscriptionRegistry::new())));

        Self {
            config,
            dispatcher,
            market_data,
            directory,
            start_time: std::time::Instant::now(),
        }
    }

    /// The registry every publish goes through.
    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        self.dispatcher.registry()
    }

    /// A fresh delivery sink sized and configured for one client connection.
    pub fn new_sink(&self) -> SinkHandle {
        SinkHandle::new(self.config.sink_queue_capacity, self.overflow_policy())
    }

    pub fn overflow_policy(&self) -> OverflowPolicy {
        self.config.overflow_policy
    }

    pub fn health(&self) -> HealthSnapshot {
        HealthSnapshot {
            status: "ok",
            groups: self.registry().group_count(),
            subscribers: self.registry().total_subscribers(),
            published: self.dispatcher.published(),
            delivered: self.dispatcher.delivered(),
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("bind_addr", &self.config.bind_addr)
            .field("groups", &self.registry().group_count())
            .finish_non_exhaustive()
    }
}
