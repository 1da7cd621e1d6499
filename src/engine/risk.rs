//! Pre-trade risk gate.
//!
//! Every BUY passes through two checks right before execution: the
//! live RSI against the profile's ceiling, and a fresh-headline veto
//! from the oracle. SELLs bypass the gate; exits are never blocked.
//!
//! The news check fails open: if headlines cannot be fetched or the
//! oracle cannot judge them, the trade proceeds on its technical
//! merits alone.

use std::sync::Arc;
use tracing::{info, warn};

use crate::llm::Oracle;
use crate::market::MarketData;
use crate::types::RiskProfile;

/// Headlines re-fetched for the veto check.
const VETO_HEADLINE_LIMIT: usize = 3;

/// Outcome of the gate for a proposed BUY.
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    Approved,
    /// Live RSI at or above the profile's ceiling.
    RsiTooHigh { rsi: f64, ceiling: f64 },
    /// The oracle flagged a disqualifying headline.
    NewsVeto,
}

impl GateDecision {
    pub fn is_approved(&self) -> bool {
        matches!(self, GateDecision::Approved)
    }
}

pub struct RiskGate {
    market: Arc<dyn MarketData>,
    oracle: Arc<dyn Oracle>,
}

impl RiskGate {
    pub fn new(market: Arc<dyn MarketData>, oracle: Arc<dyn Oracle>) -> Self {
        Self { market, oracle }
    }

    /// Gate a proposed BUY of `symbol` at the given live RSI.
    pub async fn approve_buy(
        &self,
        symbol: &str,
        live_rsi: f64,
        profile: RiskProfile,
    ) -> GateDecision {
        let ceiling = profile.rsi_ceiling();
        if live_rsi >= ceiling {
            info!(symbol, rsi = live_rsi, ceiling, "BUY rejected: RSI at or above ceiling");
            return GateDecision::RsiTooHigh {
                rsi: live_rsi,
                ceiling,
            };
        }

        let headlines = match self.market.fetch_headlines(symbol, VETO_HEADLINE_LIMIT).await {
            Ok(headlines) => headlines,
            Err(e) => {
                warn!(symbol, error = %e, "News check unavailable, proceeding without veto");
                return GateDecision::Approved;
            }
        };

        if headlines.is_empty() {
            return GateDecision::Approved;
        }

        match self.oracle.news_verdict(symbol, &headlines).await {
            Ok(verdict) if verdict.is_fatal() => {
                info!(symbol, "BUY vetoed on breaking news");
                GateDecision::NewsVeto
            }
            Ok(_) => GateDecision::Approved,
            Err(e) => {
                warn!(symbol, error = %e, "News verdict failed, proceeding without veto");
                GateDecision::Approved
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::NewsVerdict;
    use crate::market::{Headline, Lookback, StockSnapshot};
    use crate::screener::Candidate;
    use crate::types::{FundError, Position, Recommendation, Settings};
    use async_trait::async_trait;

    /// Market stub: configurable headlines result.
    struct StubMarket {
        headlines: Result<Vec<Headline>, ()>,
    }

    #[async_trait]
    impl MarketData for StubMarket {
        async fn fetch_snapshot(
            &self,
            symbol: &str,
            _lookback: Lookback,
        ) -> Result<StockSnapshot, FundError> {
            Err(FundError::Fetch {
                symbol: symbol.to_string(),
                message: "not used".into(),
            })
        }

        async fn fetch_headlines(
            &self,
            symbol: &str,
            _limit: usize,
        ) -> Result<Vec<Headline>, FundError> {
            self.headlines.clone().map_err(|_| FundError::Fetch {
                symbol: symbol.to_string(),
                message: "news down".into(),
            })
        }
    }

    /// Oracle stub: configurable verdict result.
    struct StubOracle {
        verdict: Result<NewsVerdict, ()>,
    }

    #[async_trait]
    impl Oracle for StubOracle {
        async fn recommend(
            &self,
            _candidate: &Candidate,
            _snapshot: &StockSnapshot,
            _holding: Option<&Position>,
            _settings: &Settings,
        ) -> Result<Recommendation, FundError> {
            unreachable!("gate never asks for recommendations")
        }

        async fn news_verdict(
            &self,
            _symbol: &str,
            _headlines: &[Headline],
        ) -> Result<NewsVerdict, FundError> {
            self.verdict
                .map_err(|_| FundError::OracleProvider("oracle down".into()))
        }

        fn model_name(&self) -> &str {
            "stub"
        }
    }

    fn headline() -> Headline {
        Headline {
            title: "Something happened".into(),
            publisher: None,
        }
    }

    fn gate(
        headlines: Result<Vec<Headline>, ()>,
        verdict: Result<NewsVerdict, ()>,
    ) -> RiskGate {
        RiskGate::new(
            Arc::new(StubMarket { headlines }),
            Arc::new(StubOracle { verdict }),
        )
    }

    #[tokio::test]
    async fn test_rsi_below_ceiling_approved() {
        let gate = gate(Ok(vec![]), Ok(NewsVerdict::Clear));
        let decision = gate
            .approve_buy("TCS.NS", 54.9, RiskProfile::Balanced)
            .await;
        assert!(decision.is_approved());
    }

    #[tokio::test]
    async fn test_rsi_at_ceiling_rejected() {
        // The ceiling is strict: exactly 55 under Balanced is a reject.
        let gate = gate(Ok(vec![]), Ok(NewsVerdict::Clear));
        let decision = gate.approve_buy("TCS.NS", 55.0, RiskProfile::Balanced).await;
        assert_eq!(
            decision,
            GateDecision::RsiTooHigh {
                rsi: 55.0,
                ceiling: 55.0
            }
        );
    }

    #[tokio::test]
    async fn test_ceiling_varies_by_profile() {
        let gate = gate(Ok(vec![]), Ok(NewsVerdict::Clear));
        assert!(!gate
            .approve_buy("X", 45.0, RiskProfile::Conservative)
            .await
            .is_approved());
        assert!(gate
            .approve_buy("X", 45.0, RiskProfile::Aggressive)
            .await
            .is_approved());
    }

    #[tokio::test]
    async fn test_fatal_news_vetoes() {
        let gate = gate(Ok(vec![headline()]), Ok(NewsVerdict::Fatal));
        let decision = gate.approve_buy("TCS.NS", 30.0, RiskProfile::Balanced).await;
        assert_eq!(decision, GateDecision::NewsVeto);
    }

    #[tokio::test]
    async fn test_clear_news_approves() {
        let gate = gate(Ok(vec![headline()]), Ok(NewsVerdict::Clear));
        assert!(gate
            .approve_buy("TCS.NS", 30.0, RiskProfile::Balanced)
            .await
            .is_approved());
    }

    #[tokio::test]
    async fn test_news_fetch_failure_fails_open() {
        let gate = gate(Err(()), Ok(NewsVerdict::Fatal));
        assert!(gate
            .approve_buy("TCS.NS", 30.0, RiskProfile::Balanced)
            .await
            .is_approved());
    }

    #[tokio::test]
    async fn test_oracle_failure_fails_open() {
        let gate = gate(Ok(vec![headline()]), Err(()));
        assert!(gate
            .approve_buy("TCS.NS", 30.0, RiskProfile::Balanced)
            .await
            .is_approved());
    }
}
