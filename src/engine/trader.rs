//! Trader cycle.
//!
//! Market-hours phase: act on the day's strategy batch. The account
//! must be ACTIVE and inside its investment period before anything is
//! fetched. Each pick is re-priced intraday, BUYs pass the risk gate
//! and the sizer, SELLs exit the full position immediately.

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use super::executor::Executor;
use super::risk::RiskGate;
use super::{governor, sizer};
use crate::llm::Oracle;
use crate::market::{Lookback, MarketData};
use crate::screener::{self, RSI_PERIOD};
use crate::store::Store;
use crate::types::{price_to_decimal, Decision, FundError};

pub struct Trader {
    store: Arc<Store>,
    market: Arc<dyn MarketData>,
    oracle: Arc<dyn Oracle>,
    account_id: String,
}

/// What one trader run did.
#[derive(Debug, Default)]
pub struct TraderReport {
    pub executed: usize,
    pub skipped: usize,
    pub vetoed: usize,
}

impl Trader {
    pub fn new(
        store: Arc<Store>,
        market: Arc<dyn MarketData>,
        oracle: Arc<dyn Oracle>,
        account_id: String,
    ) -> Self {
        Self {
            store,
            market,
            oracle,
            account_id,
        }
    }

    /// Execute the day's batch against live prices.
    pub async fn run_cycle(&self) -> Result<TraderReport, FundError> {
        let account = self.store.load_account(&self.account_id).await?;

        if account.settings.status != crate::types::AccountStatus::Active {
            info!(status = %account.settings.status, "Account not active, trader idle");
            return Ok(TraderReport::default());
        }

        governor::check(&account.settings, Utc::now())?;

        let today = Utc::now().date_naive();
        let Some(batch) = self.store.load_batch(today).await? else {
            info!(%today, "No strategy batch for today, nothing to trade");
            return Ok(TraderReport::default());
        };

        info!(picks = batch.watchlist.len(), "Trader cycle started");

        let gate = RiskGate::new(Arc::clone(&self.market), Arc::clone(&self.oracle));
        let executor = Executor::new(Arc::clone(&self.store), self.account_id.clone());
        let mut report = TraderReport::default();

        for rec in &batch.watchlist {
            // Balance and holdings move with every fill.
            let account = self.store.load_account(&self.account_id).await?;

            let snapshot = match self
                .market
                .fetch_snapshot(&rec.symbol, Lookback::FiveDaysIntraday)
                .await
            {
                Ok(snapshot) => snapshot,
                Err(e) if e.is_symbol_local() => {
                    warn!(symbol = %rec.symbol, error = %e, "Intraday fetch failed, skipping");
                    report.skipped += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let Some(price) = snapshot.latest_close() else {
                report.skipped += 1;
                continue;
            };

            let outcome = match rec.decision {
                Decision::Sell => {
                    let Some(position) = account.holding(&rec.symbol) else {
                        warn!(symbol = %rec.symbol, "SELL pick for unheld symbol, skipping");
                        report.skipped += 1;
                        continue;
                    };
                    // Full exit at the live price.
                    executor
                        .sell(&rec.symbol, price, position.qty, &rec.reasoning)
                        .await
                }
                Decision::Buy => {
                    // Only entries need an RSI; an exit needs just a price.
                    let closes = snapshot.closes();
                    let Some(live_rsi) = screener::rsi(&closes, RSI_PERIOD) else {
                        warn!(symbol = %rec.symbol, "Too little intraday history for RSI, skipping");
                        report.skipped += 1;
                        continue;
                    };

                    let gate_decision = gate
                        .approve_buy(&rec.symbol, live_rsi, account.settings.risk_profile)
                        .await;
                    if !gate_decision.is_approved() {
                        report.vetoed += 1;
                        continue;
                    }

                    let price_dec = match price_to_decimal(price) {
                        Ok(p) => p,
                        Err(e) => {
                            warn!(symbol = %rec.symbol, error = %e, "Unusable live price, skipping");
                            report.skipped += 1;
                            continue;
                        }
                    };
                    let qty = sizer::size_buy(account.balance, price_dec);
                    if qty == 0 {
                        info!(symbol = %rec.symbol, balance = %account.balance, "Unaffordable, skipping");
                        report.skipped += 1;
                        continue;
                    }

                    executor.buy(&rec.symbol, price, qty, &rec.reasoning).await
                }
                Decision::Wait | Decision::Avoid => {
                    // Batches only carry actionable picks; tolerate
                    // stale rows anyway.
                    report.skipped += 1;
                    continue;
                }
            };

            match outcome {
                Ok(entry) => {
                    info!(trade = %entry, "Fill recorded");
                    report.executed += 1;
                }
                Err(e) if e.is_symbol_local() => {
                    warn!(symbol = %rec.symbol, error = %e, "Execution refused, skipping");
                    report.skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            executed = report.executed,
            skipped = report.skipped,
            vetoed = report.vetoed,
            "Trader cycle complete"
        );
        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::NewsVerdict;
    use crate::market::{Fundamentals, Headline, OhlcvBar, StockSnapshot};
    use crate::screener::Candidate;
    use crate::types::{
        Position, Recommendation, Settings, StrategyBatch, TradeAction,
    };
    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    /// Market/oracle stubs that fail the test if touched; the early
    /// exits must happen before any fetch.
    struct UntouchableMarket;

    #[async_trait]
    impl MarketData for UntouchableMarket {
        async fn fetch_snapshot(
            &self,
            _symbol: &str,
            _lookback: Lookback,
        ) -> Result<StockSnapshot, FundError> {
            panic!("market must not be touched");
        }

        async fn fetch_headlines(
            &self,
            _symbol: &str,
            _limit: usize,
        ) -> Result<Vec<Headline>, FundError> {
            panic!("market must not be touched");
        }
    }

    struct UntouchableOracle;

    #[async_trait]
    impl Oracle for UntouchableOracle {
        async fn recommend(
            &self,
            _candidate: &Candidate,
            _snapshot: &StockSnapshot,
            _holding: Option<&Position>,
            _settings: &Settings,
        ) -> Result<Recommendation, FundError> {
            panic!("oracle must not be touched");
        }

        async fn news_verdict(
            &self,
            _symbol: &str,
            _headlines: &[Headline],
        ) -> Result<NewsVerdict, FundError> {
            panic!("oracle must not be touched");
        }

        fn model_name(&self) -> &str {
            "untouchable"
        }
    }

    async fn trader_over(store: Arc<Store>) -> Trader {
        Trader::new(
            store,
            Arc::new(UntouchableMarket),
            Arc::new(UntouchableOracle),
            "user_001".into(),
        )
    }

    #[tokio::test]
    async fn test_paused_account_trades_nothing() {
        let store = Arc::new(Store::open_in_memory().await.unwrap());
        store.ensure_account("user_001", dec!(10000)).await.unwrap();
        store.toggle_status("user_001").await.unwrap(); // -> PAUSED

        let report = trader_over(Arc::clone(&store)).await.run_cycle().await.unwrap();
        assert_eq!(report.executed, 0);
    }

    #[tokio::test]
    async fn test_expired_period_halts_before_fetch() {
        let store = Arc::new(Store::open_in_memory().await.unwrap());
        store.ensure_account("user_001", dec!(10000)).await.unwrap();

        let expired = Settings {
            investment_period: "1 Day".into(),
            start_date: Utc::now() - chrono::Duration::days(5),
            ..Settings::default()
        };
        store.save_settings("user_001", &expired).await.unwrap();

        let err = trader_over(store).await.run_cycle().await.unwrap_err();
        assert!(matches!(err, FundError::PeriodExpired { .. }));
    }

    /// Five flat intraday bars: a price exists, but far too little
    /// history for an RSI.
    struct ThinTapeMarket;

    #[async_trait]
    impl MarketData for ThinTapeMarket {
        async fn fetch_snapshot(
            &self,
            symbol: &str,
            _lookback: Lookback,
        ) -> Result<StockSnapshot, FundError> {
            let history = (0..5)
                .map(|_| OhlcvBar {
                    timestamp: Utc::now(),
                    open: 110.0,
                    high: 110.0,
                    low: 110.0,
                    close: 110.0,
                    volume: 100,
                })
                .collect();
            Ok(StockSnapshot {
                symbol: symbol.to_string(),
                history,
                fundamentals: Fundamentals::default(),
                news: Vec::new(),
            })
        }

        async fn fetch_headlines(
            &self,
            _symbol: &str,
            _limit: usize,
        ) -> Result<Vec<Headline>, FundError> {
            Ok(Vec::new())
        }
    }

    fn pick(symbol: &str, decision: Decision) -> Recommendation {
        Recommendation {
            symbol: symbol.to_string(),
            decision,
            reasoning: "scripted".into(),
            technical_trend: String::new(),
            fundamental_health: String::new(),
            sentiment_score: String::new(),
        }
    }

    #[tokio::test]
    async fn test_sell_needs_only_a_price() {
        let store = Arc::new(Store::open_in_memory().await.unwrap());
        store.ensure_account("user_001", dec!(10000)).await.unwrap();
        store
            .execute_trade("user_001", "HELD.NS", TradeAction::Buy, dec!(100), 10, "seed")
            .await
            .unwrap();

        let batch = StrategyBatch::new(
            Utc::now().date_naive(),
            vec![
                pick("HELD.NS", Decision::Sell),
                pick("ALPHA.NS", Decision::Buy),
            ],
        );
        store.save_batch(&batch).await.unwrap();

        let trader = Trader::new(
            Arc::clone(&store),
            Arc::new(ThinTapeMarket),
            Arc::new(UntouchableOracle),
            "user_001".into(),
        );
        let report = trader.run_cycle().await.unwrap();

        // The exit fills at the live 110 despite the thin tape; the
        // entry still needs an RSI and is skipped.
        assert_eq!(report.executed, 1);
        assert_eq!(report.skipped, 1);

        let account = store.load_account("user_001").await.unwrap();
        assert!(account.holding("HELD.NS").is_none());
        assert_eq!(account.balance, dec!(10100));
    }

    #[tokio::test]
    async fn test_missing_batch_is_a_quiet_day() {
        let store = Arc::new(Store::open_in_memory().await.unwrap());
        store.ensure_account("user_001", dec!(10000)).await.unwrap();

        let report = trader_over(store).await.run_cycle().await.unwrap();
        assert_eq!(report.executed + report.skipped + report.vetoed, 0);
    }
}
