// =============================================================================
// Chart Reshaping — uniform `{time, open, high, low, close, [volume]}` records
// =============================================================================
//
// Intraday periods label each record with epoch seconds; daily and weekly
// periods use a `YYYY-MM-DD` date taken in the exchange's own timezone
// (the session reference timezone when the provider does not report one).
// The hourly period is the only one routed through the session bucketing
// engine, over 5-minute upstream bars.
// =============================================================================

use serde::Serialize;

use crate::market_data::bucketing::{aggregate, REFERENCE_TZ};
use crate::types::{Period, PriceHistory};

/// Time label of a chart record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ChartTime {
    Epoch(i64),
    Date(String),
}

/// One record of the historical data response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartRecord {
    pub time: ChartTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<u64>,
}

/// Reshape upstream bars for `period`.
pub fn reshape(period: Period, history: &PriceHistory) -> Vec<ChartRecord> {
    if period.uses_session_buckets() {
        return aggregate(&history.bars)
            .into_iter()
            .map(|c| ChartRecord {
                time: ChartTime::Epoch(c.bucket_start.timestamp()),
                open: c.open,
                high: c.high,
                low: c.low,
                close: c.close,
                volume: c.volume,
            })
            .collect();
    }

    let date_tz = history.exchange_tz.unwrap_or(REFERENCE_TZ);
    history
        .bars
        .iter()
        .map(|bar| ChartRecord {
            time: if period.is_daily() {
                ChartTime::Date(
                    bar.timestamp
                        .with_timezone(&date_tz)
                        .format("%Y-%m-%d")
                        .to_string(),
                )
            } else {
                ChartTime::Epoch(bar.timestamp.timestamp())
            },
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
        })
        .collect()
}
