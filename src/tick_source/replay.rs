// =============================================================================
// Historical Replay — stream stored bars as if they were live
// =============================================================================
//
// Bars are fetched lazily from the market data source and emitted one per
// pacing interval with their original timestamps. When the history is
// exhausted it is fetched again and playback restarts. An unreachable or
// empty history is reported as an error so the run loop backs off.
// =============================================================================

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use super::random_walk::round_cents;
use super::{Pacing, TickSource};
use crate::types::{Bar, CandleUpdate, TickPayload};
use crate::upstream::{MarketDataSource, RangeSpec};

pub struct ReplaySource {
    symbol: String,
    market_data: Arc<dyn MarketDataSource>,
    range: RangeSpec,
    bars: Vec<Bar>,
    cursor: usize,
    close_jitter: f64,
    pacing: Pacing,
    rng: StdRng,
}

impl ReplaySource {
    pub fn new(
        symbol: String,
        market_data: Arc<dyn MarketDataSource>,
        range: RangeSpec,
        pacing: Pacing,
    ) -> Self {
        Self {
            symbol,
            market_data,
            range,
            bars: Vec::new(),
            cursor: 0,
            close_jitter: 0.0,
            pacing,
            rng: StdRng::from_rng(&mut rand::rng()),
        }
    }

    /// Perturb each emitted close by up to `±fraction`; 0 disables it.
    pub fn with_close_jitter(mut self, fraction: f64) -> Self {
        self.close_jitter = if fraction.is_finite() { fraction.abs() } else { 0.0 };
        self
    }

    #[cfg(test)]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    async fn reload(&mut self) -> Result<()> {
        let bars = self
            .market_data
            .fetch(&self.symbol, self.range)
            .await
            .with_context(|| format!("failed to load replay history for {}", self.symbol))?
            .bars;

        if bars.is_empty() {
            anyhow::bail!("no historical bars available for {}", self.symbol);
        }

        info!(
            symbol = %self.symbol,
            interval = self.range.interval,
            bars = bars.len(),
            "replay history loaded"
        );
        self.bars = bars;
        self.cursor = 0;
        Ok(())
    }
}

#[async_trait]
impl TickSource for ReplaySource {
    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn kind(&self) -> &'static str {
        "replay"
    }

    async fn next_tick(&mut self) -> Result<TickPayload> {
        if self.cursor >= self.bars.len() {
            self.reload().await?;
        }

        let delay = self.pacing.delay(&mut self.rng);
        tokio::time::sleep(delay).await;

        let mut update = CandleUpdate::from(&self.bars[self.cursor]);
        self.cursor += 1;

        if self.close_jitter > 0.0 {
            jitter_close(&mut update, self.close_jitter, &mut self.rng);
        }
        Ok(TickPayload::Candle(update))
    }
}

/// Move the close by a random fraction in `[-fraction, fraction]` and widen
/// the high/low so they still contain it.
pub fn jitter_close<R: Rng + ?Sized>(candle: &mut CandleUpdate, fraction: f64, rng: &mut R) {
    let factor = 1.0 + rng.random_range(-fraction..=fraction);
    candle.close = round_cents(candle.close * factor);
    candle.high = candle.high.max(candle.close);
    candle.low = candle.low.min(candle.close);
}
