//! Recommendation oracle.
//!
//! Defines the `Oracle` trait over the LLM that turns screened
//! candidates into structured trade recommendations and vets breaking
//! news before an entry.

pub mod groq;

use async_trait::async_trait;

use crate::market::{Headline, StockSnapshot};
use crate::screener::Candidate;
use crate::types::{FundError, Position, Recommendation, Settings};

/// Outcome of the pre-trade news check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewsVerdict {
    /// Disqualifying headline found; the entry must be vetoed.
    Fatal,
    /// Nothing disqualifying (or the check could not run).
    Clear,
}

impl NewsVerdict {
    pub fn is_fatal(&self) -> bool {
        matches!(self, NewsVerdict::Fatal)
    }
}

/// Abstraction over the recommendation LLM.
///
/// Provider failures surface as `FundError::OracleProvider`; output the
/// provider returned but that cannot be understood surfaces as
/// `FundError::OracleMalformed`. Neither is ever silently coerced into
/// a WAIT.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Produce a structured recommendation for one screened candidate.
    async fn recommend(
        &self,
        candidate: &Candidate,
        snapshot: &StockSnapshot,
        holding: Option<&Position>,
        settings: &Settings,
    ) -> Result<Recommendation, FundError>;

    /// Judge whether recent headlines disqualify an entry.
    async fn news_verdict(
        &self,
        symbol: &str,
        headlines: &[Headline],
    ) -> Result<NewsVerdict, FundError>;

    /// Model identifier string.
    fn model_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_is_fatal() {
        assert!(NewsVerdict::Fatal.is_fatal());
        assert!(!NewsVerdict::Clear.is_fatal());
    }
}
