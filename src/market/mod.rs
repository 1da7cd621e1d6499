//! Market data gateway.
//!
//! Defines the `MarketData` trait and the immutable snapshot types it
//! returns. An empty or unavailable price history is a fetch failure,
//! never an empty snapshot; callers treat it as "skip this symbol".

pub mod universe;
pub mod yahoo;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::FundError;

// ---------------------------------------------------------------------------
// Snapshot types
// ---------------------------------------------------------------------------

/// One OHLCV bar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OhlcvBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Sparse fundamentals. Absent fields stay `None`, never defaulted to
/// zero, which would corrupt downstream valuation math.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fundamentals {
    pub current_price: Option<f64>,
    pub market_cap: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub debt_to_equity: Option<f64>,
    pub profit_margins: Option<f64>,
    pub sector: Option<String>,
    pub industry: Option<String>,
}

/// A recent headline for a symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Headline {
    pub title: String,
    pub publisher: Option<String>,
}

/// Immutable per-symbol snapshot returned by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockSnapshot {
    pub symbol: String,
    /// Ordered oldest → newest; guaranteed non-empty.
    pub history: Vec<OhlcvBar>,
    pub fundamentals: Fundamentals,
    /// Up to a handful of recent headlines, newest first.
    pub news: Vec<Headline>,
}

impl StockSnapshot {
    /// Latest close price. The gateway guarantees at least one bar.
    pub fn latest_close(&self) -> Option<f64> {
        self.history.last().map(|b| b.close)
    }

    /// Close series, oldest → newest.
    pub fn closes(&self) -> Vec<f64> {
        self.history.iter().map(|b| b.close).collect()
    }
}

/// Requested lookback window for a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookback {
    /// 3 months of daily bars, enough history for SMA(50) screening.
    ThreeMonthsDaily,
    /// 5 days of 15-minute bars, intraday RSI for the trader cycle.
    FiveDaysIntraday,
}

impl Lookback {
    pub fn range(&self) -> &'static str {
        match self {
            Lookback::ThreeMonthsDaily => "3mo",
            Lookback::FiveDaysIntraday => "5d",
        }
    }

    pub fn interval(&self) -> &'static str {
        match self {
            Lookback::ThreeMonthsDaily => "1d",
            Lookback::FiveDaysIntraday => "15m",
        }
    }
}

// ---------------------------------------------------------------------------
// Gateway trait
// ---------------------------------------------------------------------------

/// Abstraction over the external market data provider.
///
/// Read-only; no retries beyond the HTTP client's own timeout. Fetch
/// failures are per-symbol and non-fatal to a cycle.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Fetch history, fundamentals, and recent news for one symbol.
    ///
    /// Returns `FundError::Fetch` when the price history is empty or
    /// unavailable. Fundamentals and news are best-effort.
    async fn fetch_snapshot(
        &self,
        symbol: &str,
        lookback: Lookback,
    ) -> Result<StockSnapshot, FundError>;

    /// Fetch only the latest headlines for a symbol (risk-gate re-check).
    async fn fetch_headlines(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<Headline>, FundError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookback_params() {
        assert_eq!(Lookback::ThreeMonthsDaily.range(), "3mo");
        assert_eq!(Lookback::ThreeMonthsDaily.interval(), "1d");
        assert_eq!(Lookback::FiveDaysIntraday.range(), "5d");
        assert_eq!(Lookback::FiveDaysIntraday.interval(), "15m");
    }

    #[test]
    fn test_snapshot_latest_close() {
        let snap = StockSnapshot {
            symbol: "TCS.NS".into(),
            history: vec![
                OhlcvBar {
                    timestamp: Utc::now(),
                    open: 100.0,
                    high: 105.0,
                    low: 99.0,
                    close: 104.0,
                    volume: 1000,
                },
                OhlcvBar {
                    timestamp: Utc::now(),
                    open: 104.0,
                    high: 110.0,
                    low: 103.0,
                    close: 108.0,
                    volume: 1500,
                },
            ],
            fundamentals: Fundamentals::default(),
            news: Vec::new(),
        };
        assert_eq!(snap.latest_close(), Some(108.0));
        assert_eq!(snap.closes(), vec![104.0, 108.0]);
    }

    #[test]
    fn test_fundamentals_absent_stays_none() {
        let f = Fundamentals::default();
        assert!(f.pe_ratio.is_none());
        assert!(f.market_cap.is_none());
        assert!(f.sector.is_none());
    }
}
