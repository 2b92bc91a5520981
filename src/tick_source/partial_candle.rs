// =============================================================================
// Partial Candle — a forming candle updated in real time
// =============================================================================
//
// Random-walk prices are folded into a fixed-interval candle. Each price is
// published as the updated in-progress candle. When a price opens a new
// interval the finished candle is published first, and the new one follows
// on the next call without waiting for another pacing slot.
// =============================================================================

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use super::random_walk::RandomWalkSource;
use super::{Pacing, TickSource};
use crate::market_data::{BuilderStep, PartialCandleBuilder};
use crate::types::{CandleUpdate, TickPayload};

type Clock = Box<dyn FnMut() -> DateTime<Utc> + Send>;

pub struct PartialCandleSource {
    walk: RandomWalkSource,
    builder: PartialCandleBuilder,
    pending: Option<CandleUpdate>,
    clock: Clock,
}

impl PartialCandleSource {
    pub fn new(symbol: String, start_price: f64, interval_secs: u64, pacing: Pacing) -> Self {
        Self::from_walk(
            RandomWalkSource::new(symbol, start_price, pacing),
            interval_secs,
        )
    }

    fn from_walk(walk: RandomWalkSource, interval_secs: u64) -> Self {
        Self {
            walk,
            builder: PartialCandleBuilder::new(interval_secs),
            pending: None,
            clock: Box::new(Utc::now),
        }
    }

    /// Replace the wall clock used to place prices into intervals.
    #[cfg(test)]
    pub fn with_clock(mut self, clock: impl FnMut() -> DateTime<Utc> + Send + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }
}

#[async_trait]
impl TickSource for PartialCandleSource {
    fn symbol(&self) -> &str {
        self.walk.symbol()
    }

    fn kind(&self) -> &'static str {
        "partial_candle"
    }

    async fn next_tick(&mut self) -> Result<TickPayload> {
        if let Some(current) = self.pending.take() {
            return Ok(TickPayload::Candle(current));
        }

        let price = self.walk.next_price().await;
        let at = (self.clock)();

        match self.builder.push(price, at) {
            BuilderStep::Updated(current) => Ok(TickPayload::Candle(current)),
            BuilderStep::Rolled { finalized, current } => {
                debug!(
                    symbol = %self.walk.symbol(),
                    time = finalized.time,
                    close = finalized.close,
                    "candle finalized"
                );
                self.pending = Some(current);
                Ok(TickPayload::Candle(finalized))
            }
        }
    }
}
