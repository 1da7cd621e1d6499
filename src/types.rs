//! Shared types for the MAVERICK fund.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that market, screener, oracle,
//! and engine modules can depend on them without circular references.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lossy `f64` → `Decimal` conversion for test fixtures and display math.
/// Execution-path conversions go through [`price_to_decimal`] instead.
pub fn d(v: f64) -> Decimal {
    Decimal::from_f64_retain(v).unwrap_or_default()
}

/// Convert a live price to `Decimal`, rejecting NaN/infinite values.
pub fn price_to_decimal(price: f64) -> Result<Decimal, FundError> {
    Decimal::from_f64_retain(price)
        .filter(|p| *p > Decimal::ZERO)
        .ok_or_else(|| FundError::Fetch {
            symbol: String::new(),
            message: format!("non-positive or non-finite price: {price}"),
        })
}

// ---------------------------------------------------------------------------
// Account & settings
// ---------------------------------------------------------------------------

/// The single fund account. Read model only; every mutation goes
/// through the execution engine's transactional update in `store`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    /// Available cash, never negative.
    pub balance: Decimal,
    /// Cash-basis reference set at creation or reset. Reporting only.
    pub capital: Decimal,
    pub settings: Settings,
    /// At most one position per symbol; qty ≤ 0 never persists.
    pub holdings: Vec<Position>,
}

impl Account {
    /// The position held for `symbol`, if any.
    pub fn holding(&self, symbol: &str) -> Option<&Position> {
        self.holdings.iter().find(|p| p.symbol == symbol)
    }

    /// Cost basis of all open positions.
    pub fn holdings_cost(&self) -> Decimal {
        self.holdings
            .iter()
            .map(|p| Decimal::from(p.qty) * p.avg_price)
            .sum()
    }
}

/// User-level fund settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub risk_profile: RiskProfile,
    /// Free text of the form "N Unit(s)", e.g. "2 Weeks", "6 Months".
    pub investment_period: String,
    /// Target return in percent, drives the oracle's strategy framing.
    pub expected_return: Decimal,
    pub start_date: DateTime<Utc>,
    pub status: AccountStatus,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            risk_profile: RiskProfile::Balanced,
            investment_period: "1 Month".to_string(),
            expected_return: Decimal::from(15),
            start_date: Utc::now(),
            status: AccountStatus::Active,
        }
    }
}

/// Risk appetite, controls the RSI entry ceiling and prompt framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskProfile {
    Conservative,
    Balanced,
    Aggressive,
}

impl RiskProfile {
    /// Maximum live RSI at which a BUY may still proceed.
    pub fn rsi_ceiling(&self) -> f64 {
        match self {
            RiskProfile::Conservative => 40.0,
            RiskProfile::Balanced => 55.0,
            RiskProfile::Aggressive => 70.0,
        }
    }
}

impl fmt::Display for RiskProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskProfile::Conservative => write!(f, "Conservative"),
            RiskProfile::Balanced => write!(f, "Balanced"),
            RiskProfile::Aggressive => write!(f, "Aggressive"),
        }
    }
}

impl std::str::FromStr for RiskProfile {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "conservative" => Ok(RiskProfile::Conservative),
            "balanced" => Ok(RiskProfile::Balanced),
            "aggressive" => Ok(RiskProfile::Aggressive),
            _ => Err(anyhow::anyhow!("Unknown risk profile: {s}")),
        }
    }
}

/// Whether the trader cycle is allowed to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountStatus {
    Active,
    Paused,
}

impl AccountStatus {
    pub fn toggled(&self) -> Self {
        match self {
            AccountStatus::Active => AccountStatus::Paused,
            AccountStatus::Paused => AccountStatus::Active,
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountStatus::Active => write!(f, "ACTIVE"),
            AccountStatus::Paused => write!(f, "PAUSED"),
        }
    }
}

impl std::str::FromStr for AccountStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ACTIVE" => Ok(AccountStatus::Active),
            "PAUSED" => Ok(AccountStatus::Paused),
            _ => Err(anyhow::anyhow!("Unknown account status: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Positions & trades
// ---------------------------------------------------------------------------

/// A held quantity of one symbol with its volume-weighted cost basis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub qty: i64,
    pub avg_price: Decimal,
}

impl Position {
    /// Cost basis of this position.
    pub fn cost(&self) -> Decimal {
        Decimal::from(self.qty) * self.avg_price
    }

    /// Unrealized P&L against a live price.
    pub fn unrealized_pnl(&self, current_price: Decimal) -> Decimal {
        Decimal::from(self.qty) * (current_price - self.avg_price)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} x{} @ {:.2}", self.symbol, self.qty, self.avg_price)
    }
}

/// Direction of an executed trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeAction {
    Buy,
    Sell,
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeAction::Buy => write!(f, "BUY"),
            TradeAction::Sell => write!(f, "SELL"),
        }
    }
}

impl std::str::FromStr for TradeAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "BUY" => Ok(TradeAction::Buy),
            "SELL" => Ok(TradeAction::Sell),
            _ => Err(anyhow::anyhow!("Unknown trade action: {s}")),
        }
    }
}

/// Append-only record of one executed trade. Never mutated; only an
/// explicit account reset clears the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeLogEntry {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub action: TradeAction,
    pub price: Decimal,
    pub qty: i64,
    pub ai_reason: String,
}

impl fmt::Display for TradeLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} x{} @ {:.2} ({})",
            self.action, self.symbol, self.qty, self.price, self.ai_reason,
        )
    }
}

// ---------------------------------------------------------------------------
// Strategy types
// ---------------------------------------------------------------------------

/// Oracle trading decision for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Buy,
    Sell,
    Wait,
    Avoid,
}

impl Decision {
    /// Whether this decision should be carried into the day's watchlist.
    pub fn is_actionable(&self) -> bool {
        matches!(self, Decision::Buy | Decision::Sell)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Buy => write!(f, "BUY"),
            Decision::Sell => write!(f, "SELL"),
            Decision::Wait => write!(f, "WAIT"),
            Decision::Avoid => write!(f, "AVOID"),
        }
    }
}

/// A structured recommendation produced by the oracle.
/// Immutable once stored in a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub symbol: String,
    pub decision: Decision,
    pub reasoning: String,
    #[serde(default)]
    pub technical_trend: String,
    #[serde(default)]
    pub fundamental_health: String,
    #[serde(default)]
    pub sentiment_score: String,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} — {}", self.decision, self.symbol, self.reasoning)
    }
}

/// One day's set of recommendations. Saving a batch for an existing date
/// fully replaces its contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyBatch {
    pub date: NaiveDate,
    pub watchlist: Vec<Recommendation>,
    pub generated_at: DateTime<Utc>,
}

impl StrategyBatch {
    pub fn new(date: NaiveDate, watchlist: Vec<Recommendation>) -> Self {
        Self {
            date,
            watchlist,
            generated_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error taxonomy.
///
/// Per-symbol failures (`Fetch`, `OracleProvider`, `OracleMalformed`,
/// `InsufficientFunds`, `InsufficientHoldings`, `InvalidQuantity`) are
/// local: callers skip
/// the symbol and continue the cycle. `PeriodExpired` and `Store` are
/// cycle-fatal.
#[derive(Debug, thiserror::Error)]
pub enum FundError {
    #[error("Fetch failure ({symbol}): {message}")]
    Fetch { symbol: String, message: String },

    #[error("Oracle provider error: {0}")]
    OracleProvider(String),

    #[error("Oracle returned malformed output: {0}")]
    OracleMalformed(String),

    #[error("Insufficient funds: need {needed:.2}, have {available:.2}")]
    InsufficientFunds { needed: Decimal, available: Decimal },

    #[error("Insufficient holdings of {symbol}: requested {requested}, held {held}")]
    InsufficientHoldings {
        symbol: String,
        requested: i64,
        held: i64,
    },

    #[error("Invalid trade quantity for {symbol}: {qty}")]
    InvalidQuantity { symbol: String, qty: i64 },

    #[error("Investment period expired: {elapsed_days} days elapsed of {days_limit} allowed")]
    PeriodExpired { elapsed_days: i64, days_limit: i64 },

    #[error("Storage unavailable: {0}")]
    Store(#[from] sqlx::Error),
}

impl FundError {
    /// Whether the error is local to one symbol (skip and continue)
    /// rather than fatal to the whole cycle.
    pub fn is_symbol_local(&self) -> bool {
        !matches!(self, FundError::PeriodExpired { .. } | FundError::Store(_))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    // -- RiskProfile tests --

    #[test]
    fn test_rsi_ceiling_per_profile() {
        assert_eq!(RiskProfile::Conservative.rsi_ceiling(), 40.0);
        assert_eq!(RiskProfile::Balanced.rsi_ceiling(), 55.0);
        assert_eq!(RiskProfile::Aggressive.rsi_ceiling(), 70.0);
    }

    #[test]
    fn test_risk_profile_from_str() {
        assert_eq!(
            "aggressive".parse::<RiskProfile>().unwrap(),
            RiskProfile::Aggressive
        );
        assert_eq!(
            "Balanced".parse::<RiskProfile>().unwrap(),
            RiskProfile::Balanced
        );
        assert!("yolo".parse::<RiskProfile>().is_err());
    }

    // -- AccountStatus tests --

    #[test]
    fn test_status_toggle() {
        assert_eq!(AccountStatus::Active.toggled(), AccountStatus::Paused);
        assert_eq!(AccountStatus::Paused.toggled(), AccountStatus::Active);
    }

    #[test]
    fn test_status_roundtrip() {
        let s: AccountStatus = format!("{}", AccountStatus::Paused).parse().unwrap();
        assert_eq!(s, AccountStatus::Paused);
    }

    // -- Decision tests --

    #[test]
    fn test_decision_serde_uppercase() {
        assert_eq!(serde_json::to_string(&Decision::Buy).unwrap(), "\"BUY\"");
        let d: Decision = serde_json::from_str("\"AVOID\"").unwrap();
        assert_eq!(d, Decision::Avoid);
    }

    #[test]
    fn test_decision_actionable() {
        assert!(Decision::Buy.is_actionable());
        assert!(Decision::Sell.is_actionable());
        assert!(!Decision::Wait.is_actionable());
        assert!(!Decision::Avoid.is_actionable());
    }

    // -- Position tests --

    #[test]
    fn test_position_cost() {
        let p = Position {
            symbol: "TCS.NS".into(),
            qty: 10,
            avg_price: dec!(110.50),
        };
        assert_eq!(p.cost(), dec!(1105.00));
    }

    #[test]
    fn test_position_unrealized_pnl() {
        let p = Position {
            symbol: "TCS.NS".into(),
            qty: 5,
            avg_price: dec!(100),
        };
        assert_eq!(p.unrealized_pnl(dec!(120)), dec!(100));
        assert_eq!(p.unrealized_pnl(dec!(90)), dec!(-50));
    }

    // -- Account tests --

    #[test]
    fn test_account_holding_lookup() {
        let account = Account {
            id: "user_001".into(),
            balance: dec!(1000),
            capital: dec!(1000),
            settings: Settings::default(),
            holdings: vec![Position {
                symbol: "INFY.NS".into(),
                qty: 3,
                avg_price: dec!(50),
            }],
        };
        assert!(account.holding("INFY.NS").is_some());
        assert!(account.holding("TCS.NS").is_none());
        assert_eq!(account.holdings_cost(), dec!(150));
    }

    // -- Recommendation parsing --

    #[test]
    fn test_recommendation_from_oracle_json() {
        let json = r#"{
            "symbol": "RELIANCE.NS",
            "decision": "BUY",
            "reasoning": "Matches aggressive growth target",
            "sentiment_score": "Positive"
        }"#;
        let rec: Recommendation = serde_json::from_str(json).unwrap();
        assert_eq!(rec.decision, Decision::Buy);
        assert_eq!(rec.symbol, "RELIANCE.NS");
        // Optional fields default to empty rather than failing the parse
        assert!(rec.technical_trend.is_empty());
    }

    #[test]
    fn test_recommendation_rejects_unknown_decision() {
        let json = r#"{"symbol": "X", "decision": "HODL", "reasoning": ""}"#;
        assert!(serde_json::from_str::<Recommendation>(json).is_err());
    }

    // -- Price conversion --

    #[test]
    fn test_price_to_decimal() {
        assert_eq!(price_to_decimal(250.5).unwrap(), dec!(250.5));
        assert!(price_to_decimal(f64::NAN).is_err());
        assert!(price_to_decimal(0.0).is_err());
        assert!(price_to_decimal(-1.0).is_err());
    }

    // -- Error taxonomy --

    #[test]
    fn test_error_locality() {
        let fetch = FundError::Fetch {
            symbol: "X".into(),
            message: "timeout".into(),
        };
        assert!(fetch.is_symbol_local());

        let expired = FundError::PeriodExpired {
            elapsed_days: 31,
            days_limit: 30,
        };
        assert!(!expired.is_symbol_local());
    }

    #[test]
    fn test_insufficient_funds_display() {
        let e = FundError::InsufficientFunds {
            needed: dec!(500),
            available: dec!(100),
        };
        let msg = format!("{e}");
        assert!(msg.contains("500"));
        assert!(msg.contains("100"));
    }
}
