// =============================================================================
// Symbol Directory Client — Finnhub `/api/v1/search`
// =============================================================================
//
// SECURITY: the API token is sent as the X-Finnhub-Token header and is never
// logged or included in Debug output.
// =============================================================================

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use tracing::{debug, instrument};

use super::{SymbolDirectory, SymbolMatch};

#[derive(Clone)]
pub struct FinnhubDirectory {
    base_url: String,
    client: reqwest::Client,
}

impl FinnhubDirectory {
    pub fn new(base_url: impl Into<String>, token: &str, timeout: Duration) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        if !token.is_empty() {
            let value = HeaderValue::from_str(token).context("invalid Finnhub token")?;
            default_headers.insert("X-Finnhub-Token", value);
        }

        let client = reqwest::Client::builder()
            .default_headers(default_headers)
            .timeout(timeout)
            .build()
            .context("failed to build symbol search HTTP client")?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl SymbolDirectory for FinnhubDirectory {
    /// GET /api/v1/search?q=
    #[instrument(skip(self), name = "finnhub::search")]
    async fn search(&self, query: &str) -> Result<Vec<SymbolMatch>> {
        let url = format!("{}/api/v1/search", self.base_url);

        let resp = self
            .client
            .get(&url)
            .query(&[("q", query)])
            .send()
            .await
            .context("GET /api/v1/search request failed")?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse search response")?;

        if !status.is_success() {
            anyhow::bail!("Finnhub GET /api/v1/search returned {}: {}", status, body);
        }

        let listings = parse_search(body)?;
        debug!(count = listings.len(), "symbol search returned");
        Ok(listings)
    }
}

/// Extract the `result` array of a search response.
pub fn parse_search(body: serde_json::Value) -> Result<Vec<SymbolMatch>> {
    match body.get("result") {
        None | Some(serde_json::Value::Null) => Ok(Vec::new()),
        Some(result) => serde_json::from_value(result.clone())
            .context("search response 'result' is not a listing array"),
    }
}

impl std::fmt::Debug for FinnhubDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinnhubDirectory")
            .field("token", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_result_listings() {
        let body = json!({
            "count": 2,
            "result": [
                { "description": "APPLE INC", "displaySymbol": "AAPL", "symbol": "AAPL", "type": "Common Stock" },
                { "description": "APPLE INC", "displaySymbol": "AAPL.SW", "symbol": "AAPL.SW", "type": "Common Stock" }
            ]
        });
        let listings = parse_search(body).unwrap();
        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].display_symbol, "AAPL");
        assert_eq!(listings[1].kind, "Common Stock");
    }

    #[test]
    fn unknown_listing_fields_are_passed_through() {
        let body = json!({
            "result": [
                { "description": "TOYOTA MOTOR CORP", "displaySymbol": "7203", "symbol": "7203",
                  "type": "Common Stock", "primary": ["7203.T"], "mic": "XTKS" }
            ]
        });
        let listings = parse_search(body).unwrap();
        assert_eq!(listings[0].extra["mic"], "XTKS");

        let echoed = serde_json::to_value(&listings[0]).unwrap();
        assert_eq!(echoed["primary"][0], "7203.T");
        assert_eq!(echoed["displaySymbol"], "7203");
        assert!(echoed.get("extra").is_none());
    }

    #[test]
    fn missing_result_is_empty() {
        assert!(parse_search(json!({ "count": 0 })).unwrap().is_empty());
    }

    #[test]
    fn wrong_result_shape_is_an_error() {
        assert!(parse_search(json!({ "result": "nope" })).is_err());
    }

    #[test]
    fn debug_output_redacts_token() {
        let dir = FinnhubDirectory::new("https://finnhub.io", "secret-token", Duration::from_secs(1)).unwrap();
        let rendered = format!("{dir:?}");
        assert!(!rendered.contains("secret-token"));
    }
}
