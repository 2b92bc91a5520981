// =============================================================================
// Shared types used across the ticker gateway
// =============================================================================

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// One raw OHLC(V) sample as returned by the upstream market data source.
///
/// Upstream does not guarantee `low <= open/close <= high`; nothing in the
/// gateway relies on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: Option<u64>,
}

/// Bars fetched for one symbol, with the timezone of the exchange they
/// trade on when the provider reports it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceHistory {
    pub bars: Vec<Bar>,
    pub exchange_tz: Option<Tz>,
}

impl From<Vec<Bar>> for PriceHistory {
    fn from(bars: Vec<Bar>) -> Self {
        Self {
            bars,
            exchange_tz: None,
        }
    }
}

/// One aggregated candle covering a single session bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Start of the bucket as an absolute UTC instant.
    pub bucket_start: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<u64>,
}

/// Wire shape of a candle pushed to real-time subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandleUpdate {
    /// Epoch seconds.
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<u64>,
}

impl From<&Bar> for CandleUpdate {
    fn from(bar: &Bar) -> Self {
        Self {
            time: bar.timestamp.timestamp(),
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
        }
    }
}

impl From<&Candle> for CandleUpdate {
    fn from(candle: &Candle) -> Self {
        Self {
            time: candle.bucket_start.timestamp(),
            open: candle.open,
            high: candle.high,
            low: candle.low,
            close: candle.close,
            volume: candle.volume,
        }
    }
}

/// Wire shape of a bare price sample from the random-walk simulator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceTick {
    /// Epoch seconds.
    pub time: i64,
    pub close: f64,
}

/// Anything a tick source can publish to a ticker group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TickPayload {
    Candle(CandleUpdate),
    Price(PriceTick),
}

/// Historical period requested by chart clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Period {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "1d")]
    #[default]
    OneDay,
    #[serde(rename = "1w")]
    OneWeek,
}

impl Period {
    /// Parse a period string; anything unrecognised falls back to `1d`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "1m" => Self::OneMinute,
            "15m" => Self::FifteenMinutes,
            "1h" => Self::OneHour,
            "1d" => Self::OneDay,
            "1w" => Self::OneWeek,
            _ => Self::default(),
        }
    }

    /// Daily and weekly output is labelled with a calendar date instead of
    /// an epoch timestamp.
    pub fn is_daily(self) -> bool {
        matches!(self, Self::OneDay | Self::OneWeek)
    }

    /// Only the hourly view goes through the session bucketing engine.
    pub fn uses_session_buckets(self) -> bool {
        matches!(self, Self::OneHour)
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OneMinute => write!(f, "1m"),
            Self::FifteenMinutes => write!(f, "15m"),
            Self::OneHour => write!(f, "1h"),
            Self::OneDay => write!(f, "1d"),
            Self::OneWeek => write!(f, "1w"),
        }
    }
}

/// Canonical form of a ticker symbol used as the group key.
pub fn normalize_symbol(raw: &str) -> String {
    raw.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn unknown_period_falls_back_to_daily() {
        assert_eq!(Period::parse("3y"), Period::OneDay);
        assert_eq!(Period::parse(""), Period::OneDay);
        assert_eq!(Period::parse("15m"), Period::FifteenMinutes);
        assert_eq!(Period::default(), Period::OneDay);
    }

    #[test]
    fn period_display_matches_query_strings() {
        for raw in ["1m", "15m", "1h", "1d", "1w"] {
            assert_eq!(Period::parse(raw).to_string(), raw);
        }
    }

    #[test]
    fn symbols_are_trimmed_and_uppercased() {
        assert_eq!(normalize_symbol(" aapl "), "AAPL");
        assert_eq!(normalize_symbol("Msft"), "MSFT");
    }

    #[test]
    fn candle_update_omits_missing_volume() {
        let bar = Bar {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 4, 15, 0, 0).unwrap(),
            open: 1.0,
            high: 2.0,
            low: 0.5,
            close: 1.5,
            volume: None,
        };
        let json = serde_json::to_value(CandleUpdate::from(&bar)).unwrap();
        assert_eq!(json["time"], 1_709_564_400);
        assert!(json.get("volume").is_none());
    }
}
