//! Strategist cycle.
//!
//! Pre-market phase: screen a slice of the tradable universe plus
//! every open position, ask the oracle about each candidate, and save
//! the actionable picks as the day's strategy batch. Per-symbol
//! failures are logged and skipped; only storage failures or an
//! expired period abort the cycle.

use chrono::Utc;
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::llm::Oracle;
use crate::market::{Lookback, MarketData};
use crate::screener;
use crate::store::Store;
use crate::types::{FundError, StrategyBatch};

pub struct Strategist {
    store: Arc<Store>,
    market: Arc<dyn MarketData>,
    oracle: Arc<dyn Oracle>,
    account_id: String,
    scan_limit: usize,
    pace: Duration,
}

/// What one strategist run did.
#[derive(Debug, Default)]
pub struct StrategistReport {
    pub screened: usize,
    pub candidates: usize,
    pub picks: usize,
}

impl Strategist {
    pub fn new(
        store: Arc<Store>,
        market: Arc<dyn MarketData>,
        oracle: Arc<dyn Oracle>,
        account_id: String,
        scan_limit: usize,
        pace: Duration,
    ) -> Self {
        Self {
            store,
            market,
            oracle,
            account_id,
            scan_limit,
            pace,
        }
    }

    /// Run one full screening pass over `universe` and persist the
    /// day's batch.
    pub async fn run_cycle(&self, universe: Vec<String>) -> Result<StrategistReport, FundError> {
        let account = self.store.load_account(&self.account_id).await?;

        // Random slice of the universe, with every open position
        // screened on top regardless of the draw.
        let mut pool = universe;
        pool.retain(|s| account.holding(s).is_none());
        pool.shuffle(&mut rand::thread_rng());
        pool.truncate(self.scan_limit);

        let mut symbols: Vec<String> = account
            .holdings
            .iter()
            .map(|p| p.symbol.clone())
            .collect();
        symbols.extend(pool);

        info!(
            symbols = symbols.len(),
            holdings = account.holdings.len(),
            "Strategist cycle started"
        );

        let mut report = StrategistReport::default();
        let mut picks = Vec::new();

        for (i, symbol) in symbols.iter().enumerate() {
            if i > 0 && !self.pace.is_zero() {
                tokio::time::sleep(self.pace).await;
            }

            let snapshot = match self
                .market
                .fetch_snapshot(symbol, Lookback::ThreeMonthsDaily)
                .await
            {
                Ok(snapshot) => snapshot,
                Err(e) if e.is_symbol_local() => {
                    warn!(symbol, error = %e, "Snapshot failed, skipping symbol");
                    continue;
                }
                Err(e) => return Err(e),
            };
            report.screened += 1;

            let holding = account.holding(symbol);
            let Some(candidate) = screener::screen(&snapshot, holding.is_some()) else {
                continue;
            };
            report.candidates += 1;

            info!(
                symbol,
                reason = %candidate.reason,
                rsi = candidate.indicators.rsi,
                "Candidate found"
            );

            let rec = match self
                .oracle
                .recommend(&candidate, &snapshot, holding, &account.settings)
                .await
            {
                Ok(rec) => rec,
                Err(e) if e.is_symbol_local() => {
                    warn!(symbol, error = %e, "Oracle failed, skipping symbol");
                    continue;
                }
                Err(e) => return Err(e),
            };

            if rec.decision.is_actionable() {
                picks.push(rec);
            }
        }

        report.picks = picks.len();
        let batch = StrategyBatch::new(Utc::now().date_naive(), picks);
        self.store.save_batch(&batch).await?;

        info!(
            screened = report.screened,
            candidates = report.candidates,
            picks = report.picks,
            "Strategist cycle complete"
        );
        Ok(report)
    }
}
