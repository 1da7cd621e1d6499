//! Yahoo Finance market data client.
//!
//! Implements the `MarketData` trait over three public endpoints:
//! the v8 chart API (OHLCV history), the v10 quoteSummary API
//! (fundamentals), and the v1 search API (recent headlines).
//!
//! History is the only mandatory piece: an empty chart is a fetch
//! failure. Fundamentals and news are best-effort and degrade to
//! sparse/empty values.

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{Fundamentals, Headline, Lookback, MarketData, OhlcvBar, StockSnapshot};
use crate::types::FundError;

const CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const QUOTE_SUMMARY_URL: &str = "https://query1.finance.yahoo.com/v10/finance/quoteSummary";
const SEARCH_URL: &str = "https://query1.finance.yahoo.com/v1/finance/search";

/// Quote endpoints reject requests without a browser-like user agent.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Headlines included in a snapshot (token budget for the oracle prompt).
const SNAPSHOT_NEWS_LIMIT: usize = 3;

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Default, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<u64>>,
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryResponse {
    #[serde(rename = "quoteSummary")]
    quote_summary: QuoteSummaryBody,
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryBody {
    #[serde(default)]
    result: Option<Vec<QuoteSummaryResult>>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteSummaryResult {
    #[serde(default)]
    price: Option<PriceModule>,
    #[serde(default, rename = "summaryDetail")]
    summary_detail: Option<SummaryDetailModule>,
    #[serde(default, rename = "financialData")]
    financial_data: Option<FinancialDataModule>,
    #[serde(default, rename = "assetProfile")]
    asset_profile: Option<AssetProfileModule>,
}

#[derive(Debug, Default, Deserialize)]
struct PriceModule {
    #[serde(default, rename = "regularMarketPrice")]
    regular_market_price: Option<RawValue>,
    #[serde(default, rename = "marketCap")]
    market_cap: Option<RawValue>,
}

#[derive(Debug, Default, Deserialize)]
struct SummaryDetailModule {
    #[serde(default, rename = "trailingPE")]
    trailing_pe: Option<RawValue>,
}

#[derive(Debug, Default, Deserialize)]
struct FinancialDataModule {
    #[serde(default, rename = "debtToEquity")]
    debt_to_equity: Option<RawValue>,
    #[serde(default, rename = "profitMargins")]
    profit_margins: Option<RawValue>,
}

#[derive(Debug, Default, Deserialize)]
struct AssetProfileModule {
    #[serde(default)]
    sector: Option<String>,
    #[serde(default)]
    industry: Option<String>,
}

/// Yahoo wraps numbers as `{"raw": 3.2, "fmt": "3.20"}`.
#[derive(Debug, Default, Deserialize)]
struct RawValue {
    #[serde(default)]
    raw: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    news: Vec<SearchNewsItem>,
}

#[derive(Debug, Deserialize)]
struct SearchNewsItem {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    publisher: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct YahooClient {
    http: Client,
}

impl YahooClient {
    pub fn new() -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(20))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build market data HTTP client")?;
        Ok(Self { http })
    }

    async fn get_text(&self, url: &str, query: &[(&str, &str)]) -> Result<String, FundError> {
        let resp = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| FundError::Fetch {
                symbol: String::new(),
                message: format!("request failed: {e}"),
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FundError::Fetch {
                symbol: String::new(),
                message: format!("HTTP {status}"),
            });
        }

        resp.text().await.map_err(|e| FundError::Fetch {
            symbol: String::new(),
            message: format!("body read failed: {e}"),
        })
    }

    // -- Parsers (pure, unit-testable) ------------------------------------

    /// Parse the chart response into ordered OHLCV bars, dropping
    /// null rows (non-trading periods). Empty output is a failure.
    fn parse_chart(symbol: &str, body: &str) -> Result<Vec<OhlcvBar>, FundError> {
        let parsed: ChartResponse =
            serde_json::from_str(body).map_err(|e| FundError::Fetch {
                symbol: symbol.to_string(),
                message: format!("chart parse error: {e}"),
            })?;

        let result = parsed
            .chart
            .result
            .and_then(|mut r| if r.is_empty() { None } else { Some(r.remove(0)) })
            .ok_or_else(|| FundError::Fetch {
                symbol: symbol.to_string(),
                message: "chart result missing".to_string(),
            })?;

        let quote = result
            .indicators
            .quote
            .into_iter()
            .next()
            .unwrap_or_default();

        let mut bars = Vec::with_capacity(result.timestamp.len());
        for (i, ts) in result.timestamp.iter().enumerate() {
            let close = quote.close.get(i).copied().flatten();
            let (open, high, low) = (
                quote.open.get(i).copied().flatten(),
                quote.high.get(i).copied().flatten(),
                quote.low.get(i).copied().flatten(),
            );
            let volume = quote.volume.get(i).copied().flatten().unwrap_or(0);

            if let (Some(close), Some(ts)) = (close, Utc.timestamp_opt(*ts, 0).single()) {
                bars.push(OhlcvBar {
                    timestamp: ts,
                    open: open.unwrap_or(close),
                    high: high.unwrap_or(close),
                    low: low.unwrap_or(close),
                    close,
                    volume,
                });
            }
        }

        if bars.is_empty() {
            return Err(FundError::Fetch {
                symbol: symbol.to_string(),
                message: "empty price history".to_string(),
            });
        }

        Ok(bars)
    }

    /// Parse quoteSummary into sparse fundamentals. Never fails: a
    /// missing module just leaves its fields `None`.
    fn parse_quote_summary(body: &str) -> Fundamentals {
        let parsed: QuoteSummaryResponse = match serde_json::from_str(body) {
            Ok(p) => p,
            Err(_) => return Fundamentals::default(),
        };

        let result = parsed
            .quote_summary
            .result
            .and_then(|mut r| if r.is_empty() { None } else { Some(r.remove(0)) })
            .unwrap_or_default();

        let price = result.price.unwrap_or_default();
        let detail = result.summary_detail.unwrap_or_default();
        let financial = result.financial_data.unwrap_or_default();
        let profile = result.asset_profile.unwrap_or_default();

        Fundamentals {
            current_price: price.regular_market_price.and_then(|v| v.raw),
            market_cap: price.market_cap.and_then(|v| v.raw),
            pe_ratio: detail.trailing_pe.and_then(|v| v.raw),
            debt_to_equity: financial.debt_to_equity.and_then(|v| v.raw),
            profit_margins: financial.profit_margins.and_then(|v| v.raw),
            sector: profile.sector,
            industry: profile.industry,
        }
    }

    /// Parse the search response into headlines, newest first.
    fn parse_search_news(body: &str, limit: usize) -> Vec<Headline> {
        let parsed: SearchResponse = match serde_json::from_str(body) {
            Ok(p) => p,
            Err(_) => return Vec::new(),
        };

        parsed
            .news
            .into_iter()
            .filter_map(|item| {
                item.title.map(|title| Headline {
                    title,
                    publisher: item.publisher,
                })
            })
            .take(limit)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// MarketData implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl MarketData for YahooClient {
    async fn fetch_snapshot(
        &self,
        symbol: &str,
        lookback: Lookback,
    ) -> Result<StockSnapshot, FundError> {
        // History is mandatory.
        let chart_url = format!("{CHART_URL}/{symbol}");
        let body = self
            .get_text(
                &chart_url,
                &[("range", lookback.range()), ("interval", lookback.interval())],
            )
            .await
            .map_err(|e| FundError::Fetch {
                symbol: symbol.to_string(),
                message: e.to_string(),
            })?;
        let history = Self::parse_chart(symbol, &body)?;

        // Fundamentals are best-effort.
        let summary_url = format!("{QUOTE_SUMMARY_URL}/{symbol}");
        let fundamentals = match self
            .get_text(
                &summary_url,
                &[("modules", "price,summaryDetail,financialData,assetProfile")],
            )
            .await
        {
            Ok(body) => Self::parse_quote_summary(&body),
            Err(e) => {
                debug!(symbol, error = %e, "Fundamentals fetch failed, continuing sparse");
                Fundamentals::default()
            }
        };

        // News is best-effort.
        let news = match self.fetch_headlines(symbol, SNAPSHOT_NEWS_LIMIT).await {
            Ok(news) => news,
            Err(e) => {
                warn!(symbol, error = %e, "News fetch failed, continuing without");
                Vec::new()
            }
        };

        debug!(
            symbol,
            bars = history.len(),
            headlines = news.len(),
            "Snapshot fetched"
        );

        Ok(StockSnapshot {
            symbol: symbol.to_string(),
            history,
            fundamentals,
            news,
        })
    }

    async fn fetch_headlines(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<Headline>, FundError> {
        let count = limit.to_string();
        let body = self
            .get_text(SEARCH_URL, &[("q", symbol), ("newsCount", count.as_str())])
            .await
            .map_err(|e| FundError::Fetch {
                symbol: symbol.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self::parse_search_news(&body, limit))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const CHART_FIXTURE: &str = r#"{
        "chart": {
            "result": [{
                "timestamp": [1700000000, 1700086400, 1700172800],
                "indicators": {
                    "quote": [{
                        "open":   [100.0, 104.5, null],
                        "high":   [105.0, 108.0, null],
                        "low":    [99.0,  103.0, null],
                        "close":  [104.0, 107.5, null],
                        "volume": [120000, 95000, null]
                    }]
                }
            }],
            "error": null
        }
    }"#;

    #[test]
    fn test_parse_chart_drops_null_rows() {
        let bars = YahooClient::parse_chart("TCS.NS", CHART_FIXTURE).unwrap();
        assert_eq!(bars.len(), 2); // third row is all null
        assert_eq!(bars[0].close, 104.0);
        assert_eq!(bars[1].volume, 95000);
        assert!(bars[0].timestamp < bars[1].timestamp);
    }

    #[test]
    fn test_parse_chart_empty_is_failure() {
        let body = r#"{"chart": {"result": [{"timestamp": [], "indicators": {"quote": [{}]}}], "error": null}}"#;
        let err = YahooClient::parse_chart("TCS.NS", body).unwrap_err();
        assert!(matches!(err, FundError::Fetch { .. }));
    }

    #[test]
    fn test_parse_chart_missing_result_is_failure() {
        let body = r#"{"chart": {"result": null, "error": {"code": "Not Found"}}}"#;
        assert!(YahooClient::parse_chart("NOPE.NS", body).is_err());
    }

    #[test]
    fn test_parse_chart_garbage_is_failure() {
        assert!(YahooClient::parse_chart("X", "not json").is_err());
    }

    #[test]
    fn test_parse_quote_summary() {
        let body = r#"{
            "quoteSummary": {
                "result": [{
                    "price": {
                        "regularMarketPrice": {"raw": 3521.5, "fmt": "3,521.50"},
                        "marketCap": {"raw": 1.28e13}
                    },
                    "summaryDetail": {"trailingPE": {"raw": 29.4}},
                    "financialData": {"debtToEquity": {"raw": 8.9}, "profitMargins": {"raw": 0.19}},
                    "assetProfile": {"sector": "Technology", "industry": "IT Services"}
                }],
                "error": null
            }
        }"#;
        let f = YahooClient::parse_quote_summary(body);
        assert_eq!(f.current_price, Some(3521.5));
        assert_eq!(f.pe_ratio, Some(29.4));
        assert_eq!(f.sector.as_deref(), Some("Technology"));
    }

    #[test]
    fn test_parse_quote_summary_sparse() {
        let body = r#"{"quoteSummary": {"result": [{"price": {}}], "error": null}}"#;
        let f = YahooClient::parse_quote_summary(body);
        assert!(f.current_price.is_none());
        assert!(f.pe_ratio.is_none());
        // Absence is represented, never defaulted to zero
        assert_ne!(f.market_cap, Some(0.0));
    }

    #[test]
    fn test_parse_quote_summary_garbage_degrades() {
        let f = YahooClient::parse_quote_summary("<html>rate limited</html>");
        assert!(f.current_price.is_none());
    }

    #[test]
    fn test_parse_search_news() {
        let body = r#"{
            "news": [
                {"title": "Quarterly results beat estimates", "publisher": "Mint"},
                {"title": "New contract win", "publisher": "ET"},
                {"title": "Third headline", "publisher": null},
                {"title": "Fourth headline", "publisher": "BS"}
            ]
        }"#;
        let news = YahooClient::parse_search_news(body, 3);
        assert_eq!(news.len(), 3);
        assert_eq!(news[0].title, "Quarterly results beat estimates");
        assert_eq!(news[0].publisher.as_deref(), Some("Mint"));
        assert!(news[2].publisher.is_none());
    }

    #[test]
    fn test_parse_search_news_empty() {
        assert!(YahooClient::parse_search_news(r#"{"news": []}"#, 3).is_empty());
        assert!(YahooClient::parse_search_news("oops", 3).is_empty());
    }
}
