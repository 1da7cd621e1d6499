//! Execution wrapper.
//!
//! Converts live float prices into exact decimals at the execution
//! boundary and hands the trade to the store's atomic `execute_trade`.
//! All ledger invariants are enforced there; this layer only owns the
//! price conversion and the account identity.

use std::sync::Arc;

use crate::store::Store;
use crate::types::{price_to_decimal, FundError, TradeAction, TradeLogEntry};

pub struct Executor {
    store: Arc<Store>,
    account_id: String,
}

impl Executor {
    pub fn new(store: Arc<Store>, account_id: String) -> Self {
        Self { store, account_id }
    }

    /// Buy `qty` shares at the live price.
    pub async fn buy(
        &self,
        symbol: &str,
        price: f64,
        qty: i64,
        reason: &str,
    ) -> Result<TradeLogEntry, FundError> {
        let price = price_to_decimal(price)?;
        self.store
            .execute_trade(&self.account_id, symbol, TradeAction::Buy, price, qty, reason)
            .await
    }

    /// Sell `qty` shares at the live price.
    pub async fn sell(
        &self,
        symbol: &str,
        price: f64,
        qty: i64,
        reason: &str,
    ) -> Result<TradeLogEntry, FundError> {
        let price = price_to_decimal(price)?;
        self.store
            .execute_trade(&self.account_id, symbol, TradeAction::Sell, price, qty, reason)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    async fn executor() -> Executor {
        let store = Arc::new(Store::open_in_memory().await.unwrap());
        store.ensure_account("user_001", dec!(10000)).await.unwrap();
        Executor::new(store, "user_001".into())
    }

    #[tokio::test]
    async fn test_buy_then_sell_roundtrip() {
        let ex = executor().await;
        ex.buy("TCS.NS", 100.0, 10, "entry").await.unwrap();
        let entry = ex.sell("TCS.NS", 110.0, 10, "exit").await.unwrap();
        assert_eq!(entry.action, TradeAction::Sell);
        assert_eq!(entry.price, dec!(110));
    }

    #[tokio::test]
    async fn test_bad_price_rejected_before_store() {
        let ex = executor().await;
        assert!(ex.buy("TCS.NS", f64::NAN, 1, "x").await.is_err());
        assert!(ex.buy("TCS.NS", 0.0, 1, "x").await.is_err());
    }
}
