//! Tradable-universe provider.
//!
//! Fetches the exchange's full equity symbol list (CSV) and appends the
//! `.NS` suffix. Any failure falls back to a fixed Nifty list instead of
//! aborting the strategist cycle.

use reqwest::Client;
use tracing::{info, warn};

/// Fallback list used when the exchange download fails.
const FALLBACK_UNIVERSE: &[&str] = &[
    "RELIANCE.NS", "TCS.NS", "HDFCBANK.NS", "ICICIBANK.NS", "BHARTIARTL.NS",
    "SBIN.NS", "INFY.NS", "LICI.NS", "ITC.NS", "HINDUNILVR.NS", "LT.NS",
    "BAJFINANCE.NS", "HCLTECH.NS", "MARUTI.NS", "SUNPHARMA.NS", "ADANIENT.NS",
    "KOTAKBANK.NS", "TITAN.NS", "ONGC.NS", "TATAMOTORS.NS", "NTPC.NS",
    "AXISBANK.NS", "ADANIPORTS.NS", "ULTRACEMCO.NS", "WIPRO.NS", "M&M.NS",
    "JSWSTEEL.NS", "BAJAJFINSV.NS", "BAJAJ-AUTO.NS", "LTIM.NS", "TATASTEEL.NS",
    "COALINDIA.NS", "SIEMENS.NS", "SBILIFE.NS", "GRASIM.NS", "POWERGRID.NS",
    "TECHM.NS", "HDFCLIFE.NS", "BRITANNIA.NS", "INDUSINDBANK.NS", "CIPLA.NS",
    "TATACONSUM.NS", "BPCL.NS", "NESTLEIND.NS", "DRREDDY.NS", "EICHERMOT.NS",
    "DIVISLAB.NS", "APOLLOHOSP.NS", "HINDALCO.NS", "ASIANPAINT.NS",
];

/// Default exchange equity-list endpoint.
const DEFAULT_UNIVERSE_URL: &str =
    "https://nsearchives.nseindia.com/content/equities/EQUITY_L.csv";

pub struct UniverseProvider {
    http: Client,
    url: String,
}

impl UniverseProvider {
    pub fn new(http: Client, url: Option<String>) -> Self {
        Self {
            http,
            url: url.unwrap_or_else(|| DEFAULT_UNIVERSE_URL.to_string()),
        }
    }

    /// Fetch the full symbol list, falling back to the fixed list on any
    /// download or parse failure.
    pub async fn symbols(&self) -> Vec<String> {
        match self.fetch_remote().await {
            Ok(symbols) if !symbols.is_empty() => {
                info!(count = symbols.len(), "Universe fetched from exchange");
                symbols
            }
            Ok(_) => {
                warn!("Exchange returned an empty symbol list, using fallback");
                Self::fallback()
            }
            Err(e) => {
                warn!(error = %e, "Universe fetch failed, using fallback");
                Self::fallback()
            }
        }
    }

    /// The fixed fallback universe.
    pub fn fallback() -> Vec<String> {
        FALLBACK_UNIVERSE.iter().map(|s| s.to_string()).collect()
    }

    async fn fetch_remote(&self) -> anyhow::Result<Vec<String>> {
        let body = self
            .http
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(Self::parse_symbol_csv(&body))
    }

    /// Extract the SYMBOL column from the exchange CSV and append `.NS`.
    fn parse_symbol_csv(csv: &str) -> Vec<String> {
        let mut lines = csv.lines();
        let header = match lines.next() {
            Some(h) => h,
            None => return Vec::new(),
        };

        let symbol_idx = match header
            .split(',')
            .position(|col| col.trim().eq_ignore_ascii_case("SYMBOL"))
        {
            Some(idx) => idx,
            None => return Vec::new(), // format changed, caller falls back
        };

        lines
            .filter_map(|line| line.split(',').nth(symbol_idx))
            .map(|sym| format!("{}.NS", sym.trim()))
            .filter(|sym| sym.len() > 3)
            .collect()
    }
}
