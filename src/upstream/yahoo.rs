// =============================================================================
// Chart API Client — historical OHLCV bars over HTTP
// =============================================================================
//
// Talks to a Yahoo-style `/v8/finance/chart/{symbol}` endpoint. The response
// carries parallel arrays (timestamp, open, high, low, close, volume) where any
// entry may be null; rows missing a price are skipped.
// =============================================================================

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use chrono_tz::Tz;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{StatusCode, Url};
use tracing::{debug, instrument, warn};

use super::{MarketDataSource, RangeSpec};
use crate::types::{Bar, PriceHistory};

/// HTTP client for the chart API.
#[derive(Clone)]
pub struct YahooChartClient {
    base_url: Url,
    client: reqwest::Client,
}

impl YahooChartClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static("ticker-gateway/1.0"));

        let client = reqwest::Client::builder()
            .default_headers(default_headers)
            .timeout(timeout)
            .build()
            .context("failed to build chart HTTP client")?;

        let raw = base_url.into();
        let base_url = Url::parse(&raw).with_context(|| format!("invalid chart base URL {raw}"))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("chart base URL {raw} cannot carry a path");
        }
        debug!(base_url = %base_url, "YahooChartClient initialised");

        Ok(Self { base_url, client })
    }

    /// `{base}/v8/finance/chart/{symbol}` with the symbol as one encoded path
    /// segment, so it can never reach another path, query or fragment.
    fn chart_url(&self, symbol: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("chart base URL cannot carry a path"))?
            .pop_if_empty()
            .extend(["v8", "finance", "chart", symbol]);
        Ok(url)
    }
}

#[async_trait]
impl MarketDataSource for YahooChartClient {
    /// GET /v8/finance/chart/{symbol}?range=&interval=
    #[instrument(skip(self), name = "chart::fetch")]
    async fn fetch(&self, symbol: &str, range: RangeSpec) -> Result<PriceHistory> {
        // Dot segments would be dropped from the path; no ticker is spelled that way.
        if symbol.is_empty() || symbol == "." || symbol == ".." {
            warn!(symbol, "refusing chart request for an empty path segment");
            return Ok(PriceHistory::default());
        }
        let url = self.chart_url(symbol)?;

        let resp = self
            .client
            .get(url)
            .query(&[("range", range.range), ("interval", range.interval)])
            .send()
            .await
            .context("GET /v8/finance/chart request failed")?;

        let status = resp.status();
        // Unknown tickers come back as 404; that is "no data", not a failure.
        if status == StatusCode::NOT_FOUND {
            warn!(symbol, "chart API has no such symbol");
            return Ok(PriceHistory::default());
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse chart response")?;

        if !status.is_success() {
            anyhow::bail!("chart API returned {}: {}", status, body);
        }

        let history = parse_chart(&body)?;
        debug!(
            symbol,
            interval = range.interval,
            count = history.bars.len(),
            exchange_tz = ?history.exchange_tz,
            "bars fetched"
        );
        Ok(history)
    }
}

/// Convert a chart response body into bars, keeping the exchange timezone
/// from `meta.exchangeTimezoneName` when it names a known zone.
pub fn parse_chart(body: &serde_json::Value) -> Result<PriceHistory> {
    let chart = body.get("chart").context("chart response missing 'chart'")?;

    if let Some(err) = chart.get("error").filter(|e| !e.is_null()) {
        anyhow::bail!("chart API error: {err}");
    }

    let Some(result) = chart["result"].as_array().and_then(|r| r.first()) else {
        return Ok(PriceHistory::default());
    };

    let exchange_tz = result["meta"]["exchangeTimezoneName"]
        .as_str()
        .and_then(|name| name.parse::<Tz>().ok());

    // A symbol with no trades in range has no timestamp array at all.
    let Some(timestamps) = result["timestamp"].as_array() else {
        return Ok(PriceHistory {
            bars: Vec::new(),
            exchange_tz,
        });
    };

    let quote = &result["indicators"]["quote"][0];
    let opens = column(quote, "open")?;
    let highs = column(quote, "high")?;
    let lows = column(quote, "low")?;
    let closes = column(quote, "close")?;
    let volumes = quote["volume"].as_array();

    let mut bars = Vec::with_capacity(timestamps.len());
    for (i, ts) in timestamps.iter().enumerate() {
        let Some(secs) = ts.as_i64() else {
            continue;
        };
        let prices = (
            opens.get(i).and_then(serde_json::Value::as_f64),
            highs.get(i).and_then(serde_json::Value::as_f64),
            lows.get(i).and_then(serde_json::Value::as_f64),
            closes.get(i).and_then(serde_json::Value::as_f64),
        );
        let (Some(open), Some(high), Some(low), Some(close)) = prices else {
            continue;
        };
        let Some(timestamp) = Utc.timestamp_opt(secs, 0).single() else {
            continue;
        };

        bars.push(Bar {
            timestamp,
            open,
            high,
            low,
            close,
            volume: volumes
                .and_then(|v| v.get(i))
                .and_then(serde_json::Value::as_u64),
        });
    }

    Ok(PriceHistory { bars, exchange_tz })
}

fn column<'a>(quote: &'a serde_json::Value, name: &str) -> Result<&'a Vec<serde_json::Value>> {
    quote[name]
        .as_array()
        .with_context(|| format!("chart quote missing '{name}' column"))
}

impl std::fmt::Debug for YahooChartClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YahooChartClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_parallel_arrays_and_skips_null_rows() {
        let body = json!({
            "chart": {
                "result": [{
                    "meta": { "symbol": "AAPL", "exchangeTimezoneName": "America/New_York" },
                    "timestamp": [1709650800, 1709651100, 1709651400],
                    "indicators": { "quote": [{
                        "open":   [170.1, null, 171.0],
                        "high":   [171.0, 171.5, 172.0],
                        "low":    [169.5, 170.0, 170.8],
                        "close":  [170.8, 171.2, 171.9],
                        "volume": [1200, 900, null]
                    }]}
                }],
                "error": null
            }
        });

        let history = parse_chart(&body).unwrap();
        assert_eq!(history.exchange_tz, Some(chrono_tz::America::New_York));
        let bars = history.bars;
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].timestamp.timestamp(), 1_709_650_800);
        assert_eq!(bars[0].volume, Some(1200));
        assert_eq!(bars[1].open, 171.0);
        assert_eq!(bars[1].volume, None);
    }

    #[test]
    fn missing_timestamps_mean_no_data() {
        let body = json!({
            "chart": { "result": [{ "meta": {}, "indicators": { "quote": [{}] } }], "error": null }
        });
        let history = parse_chart(&body).unwrap();
        assert!(history.bars.is_empty());
        assert_eq!(history.exchange_tz, None);
    }

    #[test]
    fn unknown_timezone_name_is_ignored() {
        let body = json!({
            "chart": { "result": [{
                "meta": { "exchangeTimezoneName": "Mars/Olympus_Mons" },
                "timestamp": [1709650800],
                "indicators": { "quote": [{ "open": [1.0], "high": [1.0], "low": [1.0], "close": [1.0] }] }
            }], "error": null }
        });
        let history = parse_chart(&body).unwrap();
        assert_eq!(history.bars.len(), 1);
        assert_eq!(history.exchange_tz, None);
    }

    fn client(base: &str) -> YahooChartClient {
        YahooChartClient::new(base, Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn chart_url_places_symbol_in_one_path_segment() {
        let url = client("https://query1.finance.yahoo.com").chart_url("AAPL").unwrap();
        assert_eq!(url.as_str(), "https://query1.finance.yahoo.com/v8/finance/chart/AAPL");

        let proxied = client("http://127.0.0.1:9000/proxy/").chart_url("BRK-B").unwrap();
        assert_eq!(proxied.path(), "/proxy/v8/finance/chart/BRK-B");
    }

    #[test]
    fn hostile_ticker_cannot_rewrite_the_upstream_request() {
        let url = client("https://query1.finance.yahoo.com")
            .chart_url("../../v7/finance/quote?symbols=MSFT#")
            .unwrap();

        let segments: Vec<&str> = url.path_segments().unwrap().collect();
        assert_eq!(segments.len(), 4);
        assert_eq!(&segments[..3], ["v8", "finance", "chart"]);
        assert!(!segments[3].contains('/'));
        assert!(url.query().is_none());
        assert!(url.fragment().is_none());
    }

    #[tokio::test]
    async fn dot_segment_ticker_is_no_data() {
        // Port 9 (discard) is never contacted: the request is refused locally.
        let chart = client("http://127.0.0.1:9");
        let range = RangeSpec::for_period(crate::types::Period::OneDay);
        assert!(chart.fetch("..", range).await.unwrap().bars.is_empty());
        assert!(chart.fetch("", range).await.unwrap().bars.is_empty());
    }

    #[test]
    fn provider_error_is_an_error() {
        let body = json!({
            "chart": { "result": null, "error": { "code": "Bad Request", "description": "Invalid range" } }
        });
        assert!(parse_chart(&body).is_err());
    }

    #[test]
    fn malformed_body_is_an_error() {
        assert!(parse_chart(&json!({ "unexpected": true })).is_err());
    }
}
