// =============================================================================
// Tick Sources — independent producers feeding the dispatcher
// =============================================================================
//
// Every configured source runs in its own task and publishes for exactly one
// symbol. A source that fails (upstream down, no history) backs off and
// retries forever; it never takes the gateway or other sources down with it.
// =============================================================================

pub mod backoff;
pub mod partial_candle;
pub mod random_walk;
pub mod replay;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use rand::Rng;
use tracing::{info, warn};

use crate::fanout::Dispatcher;
use crate::runtime_config::{PacingConfig, TickSourceConfig, TickSourceKind};
use crate::types::{normalize_symbol, TickPayload};
use crate::upstream::{MarketDataSource, RangeSpec};

pub use backoff::Backoff;
pub use partial_candle::PartialCandleSource;
pub use random_walk::RandomWalkSource;
pub use replay::ReplaySource;

/// A producer of payloads for one symbol.
///
/// `next_tick` paces itself: it returns when the next payload is due.
#[async_trait]
pub trait TickSource: Send {
    fn symbol(&self) -> &str;

    /// Short label for logs.
    fn kind(&self) -> &'static str;

    async fn next_tick(&mut self) -> Result<TickPayload>;
}

// =============================================================================
// Pacing
// =============================================================================

/// Inter-emission delay: uniform in `[min, max]` milliseconds, divided by
/// `speed`. `min == max` gives a fixed cadence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pacing {
    min_ms: u64,
    max_ms: u64,
    speed: f64,
}

impl Pacing {
    pub fn new(min_ms: u64, max_ms: u64, speed: f64) -> Self {
        Self {
            min_ms: min_ms.min(max_ms),
            max_ms: max_ms.max(min_ms),
            speed: if speed.is_finite() && speed > 0.0 { speed } else { 1.0 },
        }
    }

    #[cfg(test)]
    pub fn fixed(delay: Duration) -> Self {
        let ms = delay.as_millis() as u64;
        Self::new(ms, ms, 1.0)
    }

    pub fn delay<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let ms = if self.min_ms == self.max_ms {
            self.min_ms
        } else {
            rng.random_range(self.min_ms..=self.max_ms)
        };
        Duration::from_millis(ms).div_f64(self.speed)
    }
}

impl From<&PacingConfig> for Pacing {
    fn from(cfg: &PacingConfig) -> Self {
        Self::new(cfg.min_delay_ms, cfg.max_delay_ms, cfg.speed)
    }
}

// =============================================================================
// Construction & run loop
// =============================================================================

/// Instantiate the source described by `cfg`.
pub fn build(cfg: &TickSourceConfig, market_data: Arc<dyn MarketDataSource>) -> Box<dyn TickSource> {
    let symbol = normalize_symbol(&cfg.symbol);
    let pacing = Pacing::from(&cfg.pacing);

    match &cfg.source {
        TickSourceKind::RandomWalk { start_price } => {
            Box::new(RandomWalkSource::new(symbol, *start_price, pacing))
        }
        TickSourceKind::Replay { period, close_jitter } => Box::new(
            ReplaySource::new(symbol, market_data, RangeSpec::for_period(*period), pacing)
                .with_close_jitter(*close_jitter),
        ),
        TickSourceKind::PartialCandle { start_price, interval_secs } => Box::new(
            PartialCandleSource::new(symbol, *start_price, *interval_secs, pacing),
        ),
    }
}

/// Drive `source` forever, publishing every payload for its symbol.
///
/// Failures are logged and retried after an exponential backoff; the delay
/// resets on the first success.
pub async fn run_tick_source(
    mut source: Box<dyn TickSource>,
    dispatcher: Arc<Dispatcher>,
    mut backoff: Backoff,
) {
    let symbol = normalize_symbol(source.symbol());
    info!(symbol = %symbol, kind = source.kind(), "tick source started");

    loop {
        match source.next_tick().await {
            Ok(payload) => {
                if backoff.attempts() > 0 {
                    info!(symbol = %symbol, failures = backoff.attempts(), "tick source recovered");
                    backoff.reset();
                }
                dispatcher.dispatch(&symbol, &payload);
            }
            Err(e) => {
                let delay = backoff.next_delay();
                warn!(
                    symbol = %symbol,
                    kind = source.kind(),
                    error = %e,
                    attempt = backoff.attempts(),
                    retry_in_ms = delay.as_millis() as u64,
                    "tick source failed, backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::fanout::{OverflowPolicy, SinkHandle, SubscriptionRegistry};
    use crate::runtime_config::BackoffConfig;
    use crate::types::PriceTick;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Fails `failures` times, then emits a price every second.
    struct FlakySource {
        failures: u32,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl TickSource for FlakySource {
        fn symbol(&self) -> &str {
            "aapl"
        }

        fn kind(&self) -> &'static str {
            "flaky"
        }

        async fn next_tick(&mut self) -> Result<TickPayload> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                anyhow::bail!("upstream unavailable");
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(TickPayload::Price(PriceTick { time: n as i64, close: 100.0 }))
        }
    }

    #[test]
    fn pacing_stays_in_range_and_honours_speed() {
        let mut rng = StdRng::seed_from_u64(7);
        let pacing = Pacing::new(500, 2_000, 1.0);
        for _ in 0..100 {
            let d = pacing.delay(&mut rng);
            assert!(d >= Duration::from_millis(500) && d <= Duration::from_millis(2_000));
        }

        let fast = Pacing::new(1_000, 1_000, 4.0);
        assert_eq!(fast.delay(&mut rng), Duration::from_millis(250));
    }

    #[test]
    fn pacing_repairs_bad_config() {
        let mut rng = StdRng::seed_from_u64(1);
        let pacing = Pacing::new(900, 100, 0.0);
        let d = pacing.delay(&mut rng);
        assert!(d >= Duration::from_millis(100) && d <= Duration::from_millis(900));
    }

    #[tokio::test(start_paused = true)]
    async fn failing_source_backs_off_then_publishes() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let dispatcher = Arc::new(Dispatcher::new(registry.clone()));
        let sink = SinkHandle::new(8, OverflowPolicy::DropOldest);
        registry.subscribe("AAPL", sink.clone());

        let calls = Arc::new(AtomicU32::new(0));
        let source = Box::new(FlakySource { failures: 3, calls: calls.clone() });
        let backoff = Backoff::new(&BackoffConfig {
            initial_ms: 100,
            max_ms: 1_000,
            multiplier: 2.0,
            jitter_factor: 0.0,
        });

        let task = tokio::spawn(run_tick_source(source, dispatcher.clone(), backoff));

        let frame = tokio::time::timeout(Duration::from_secs(60), sink.recv())
            .await
            .expect("no payload after backoff")
            .expect("sink closed");
        let json: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(json["type"], "ticker.update");
        assert_eq!(json["payload"]["close"], 100.0);
        assert!(calls.load(Ordering::SeqCst) >= 4);
        assert!(dispatcher.published() >= 1);

        task.abort();
    }

    #[test]
    fn build_picks_the_configured_kind() {
        struct NoHistory;

        #[async_trait]
        impl MarketDataSource for NoHistory {
            async fn fetch(&self, _: &str, _: RangeSpec) -> Result<crate::types::PriceHistory> {
                Ok(Default::default())
            }
        }

        let market: Arc<dyn MarketDataSource> = Arc::new(NoHistory);
        let mut cfg = TickSourceConfig::random_walk("msft");
        assert_eq!(build(&cfg, market.clone()).kind(), "random_walk");
        assert_eq!(build(&cfg, market.clone()).symbol(), "MSFT");

        cfg.source = TickSourceKind::Replay { period: Default::default(), close_jitter: 0.0 };
        assert_eq!(build(&cfg, market.clone()).kind(), "replay");

        cfg.source = TickSourceKind::PartialCandle { start_price: 10.0, interval_secs: 60 };
        assert_eq!(build(&cfg, market).kind(), "partial_candle");
    }
}
