use chrono::{DateTime, Utc};

use crate::types::CandleUpdate;

// ---------------------------------------------------------------------------
// PartialCandleBuilder -- accumulates ticks into fixed-interval candles
// ---------------------------------------------------------------------------

/// Result of feeding one price into the builder.
#[derive(Debug, Clone, PartialEq)]
pub enum BuilderStep {
    /// The in-progress candle absorbed the price.
    Updated(CandleUpdate),
    /// The price opened a new interval; the previous candle is final.
    Rolled {
        finalized: CandleUpdate,
        current: CandleUpdate,
    },
}

#[cfg(test)]
impl BuilderStep {
    /// The candle that is still open after this step.
    pub fn current(&self) -> &CandleUpdate {
        match self {
            Self::Updated(current) | Self::Rolled { current, .. } => current,
        }
    }
}

/// Keeps one in-progress candle aligned to `interval_secs` boundaries.
///
/// Every price updates high/low/close of the open candle until a price lands
/// in a later interval, at which point the open candle is finalized and a new
/// one starts with that price as its open.
#[derive(Debug)]
pub struct PartialCandleBuilder {
    interval_secs: i64,
    current: Option<CandleUpdate>,
}

impl PartialCandleBuilder {
    /// Create a builder for candles of `interval_secs` seconds (minimum 1).
    pub fn new(interval_secs: u64) -> Self {
        Self {
            interval_secs: i64::try_from(interval_secs.max(1)).unwrap_or(i64::MAX),
            current: None,
        }
    }

    /// Start of the interval containing `at`, in epoch seconds.
    pub fn align(&self, at: DateTime<Utc>) -> i64 {
        let secs = at.timestamp();
        secs - secs.rem_euclid(self.interval_secs)
    }

    /// Feed one price observed at `at`.
    pub fn push(&mut self, price: f64, at: DateTime<Utc>) -> BuilderStep {
        let start = self.align(at);

        if let Some(open) = self.current.as_mut() {
            // Late prices (clock skew) still land in the open candle.
            if start <= open.time {
                open.high = open.high.max(price);
                open.low = open.low.min(price);
                open.close = price;
                return BuilderStep::Updated(open.clone());
            }
        }

        let fresh = Self::opening(start, price);
        match self.current.replace(fresh.clone()) {
            Some(finalized) => BuilderStep::Rolled {
                finalized,
                current: fresh,
            },
            None => BuilderStep::Updated(fresh),
        }
    }

    /// The candle currently being built, if any price has been seen.
    #[cfg(test)]
    pub fn current(&self) -> Option<&CandleUpdate> {
        self.current.as_ref()
    }

    fn opening(start: i64, price: f64) -> CandleUpdate {
        CandleUpdate {
            time: start,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
