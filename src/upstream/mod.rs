// =============================================================================
// Upstream collaborators — historical bars and symbol directory
// =============================================================================

pub mod finnhub;
pub mod yahoo;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{Period, PriceHistory};

pub use finnhub::FinnhubDirectory;
pub use yahoo::YahooChartClient;

/// How much history to request, in the upstream's own vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeSpec {
    pub range: &'static str,
    pub interval: &'static str,
}

impl RangeSpec {
    /// Upstream range for a chart period. The hourly view is built from
    /// 5-minute bars so the session buckets can start at 08:30.
    pub fn for_period(period: Period) -> Self {
        let (range, interval) = match period {
            Period::OneMinute => ("7d", "1m"),
            Period::FifteenMinutes => ("60d", "15m"),
            Period::OneHour => ("60d", "5m"),
            Period::OneDay => ("5y", "1d"),
            Period::OneWeek => ("max", "1wk"),
        };
        Self { range, interval }
    }
}

/// Source of historical bars. An empty history means "no data", an error
/// means the provider could not be reached or answered garbage.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn fetch(&self, symbol: &str, range: RangeSpec) -> Result<PriceHistory>;
}

/// One listing returned by the symbol directory. Fields beyond the four the
/// filter looks at are passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolMatch {
    #[serde(default)]
    pub description: String,
    #[serde(rename = "displaySymbol", default)]
    pub display_symbol: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Free-text symbol lookup.
#[async_trait]
pub trait SymbolDirectory: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SymbolMatch>>;
}

/// Tickers never offered by the search endpoint.
pub const EXCLUDED_SYMBOLS: &[&str] = &["APP"];

/// Keep common-stock style listings only: no dotted (foreign / class)
/// symbols, no crypto, nothing on the exclusion list.
pub fn filter_listings(listings: Vec<SymbolMatch>) -> Vec<SymbolMatch> {
    listings
        .into_iter()
        .filter(|m| {
            !m.symbol.contains('.')
                && m.kind != "Crypto"
                && !EXCLUDED_SYMBOLS.contains(&m.symbol.as_str())
        })
        .collect()
}
