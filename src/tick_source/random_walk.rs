// =============================================================================
// Random Walk — simulated last-trade prices
// =============================================================================

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{Pacing, TickSource};
use crate::types::{PriceTick, TickPayload};

/// Largest price move between two consecutive ticks, in either direction.
pub const MAX_STEP: f64 = 0.15;

/// Emits `{time, close}` samples of a bounded random walk.
///
/// The walk itself keeps full precision; only emitted prices are rounded to
/// cents.
#[derive(Debug)]
pub struct RandomWalkSource {
    symbol: String,
    last_price: f64,
    pacing: Pacing,
    rng: StdRng,
}

impl RandomWalkSource {
    pub fn new(symbol: String, start_price: f64, pacing: Pacing) -> Self {
        Self::with_rng(symbol, start_price, pacing, StdRng::from_rng(&mut rand::rng()))
    }

    #[cfg(test)]
    pub fn seeded(symbol: String, start_price: f64, pacing: Pacing, seed: u64) -> Self {
        Self::with_rng(symbol, start_price, pacing, StdRng::seed_from_u64(seed))
    }

    fn with_rng(symbol: String, start_price: f64, pacing: Pacing, rng: StdRng) -> Self {
        Self {
            symbol,
            last_price: start_price,
            pacing,
            rng,
        }
    }

    /// Advance the walk by one step and return the rounded price.
    pub fn step(&mut self) -> f64 {
        self.last_price += self.rng.random_range(-MAX_STEP..=MAX_STEP);
        round_cents(self.last_price)
    }

    /// Wait for the next emission slot, then step.
    pub async fn next_price(&mut self) -> f64 {
        let delay = self.pacing.delay(&mut self.rng);
        tokio::time::sleep(delay).await;
        self.step()
    }
}

#[async_trait]
impl TickSource for RandomWalkSource {
    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn kind(&self) -> &'static str {
        "random_walk"
    }

    async fn next_tick(&mut self) -> Result<TickPayload> {
        let close = self.next_price().await;
        Ok(TickPayload::Price(PriceTick {
            time: Utc::now().timestamp(),
            close,
        }))
    }
}

pub(crate) fn round_cents(price: f64) -> f64 {
    (price * 100.0).round() / 100.0
}
