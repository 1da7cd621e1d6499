//! Persistence layer.
//!
//! SQLite via sqlx. Holds the single fund account, its open positions,
//! the append-only trade log, and the per-day strategy batches.
//!
//! Money columns are stored as TEXT-encoded decimals; quantities are
//! integers. Every trade goes through `execute_trade`, which checks
//! preconditions and applies the full mutation inside one transaction,
//! so a failed trade leaves no partial state behind.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::types::{
    Account, AccountStatus, FundError, Position, RiskProfile, Settings, StrategyBatch,
    TradeAction, TradeLogEntry,
};

const DATE_FMT: &str = "%Y-%m-%d";

pub struct Store {
    pool: SqlitePool,
}

// ---------------------------------------------------------------------------
// Decode helpers
// ---------------------------------------------------------------------------

fn decode_err<E>(e: E) -> FundError
where
    E: std::error::Error + Send + Sync + 'static,
{
    FundError::Store(sqlx::Error::Decode(Box::new(e)))
}

fn decode_msg(msg: String) -> FundError {
    FundError::Store(sqlx::Error::Decode(msg.into()))
}

fn parse_decimal(s: &str) -> Result<Decimal, FundError> {
    s.parse::<Decimal>().map_err(decode_err)
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, FundError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(decode_err)
}

impl Store {
    // -----------------------------------------------------------------------
    // Setup
    // -----------------------------------------------------------------------

    /// Open (creating if missing) the database at `path`.
    pub async fn open(path: &str) -> Result<Self, FundError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        info!(path, "Database opened");
        Ok(store)
    }

    /// In-memory database for tests. A single connection keeps every
    /// query on the same memory database.
    pub async fn open_in_memory() -> Result<Self, FundError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), FundError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                balance TEXT NOT NULL,
                capital TEXT NOT NULL,
                risk_profile TEXT NOT NULL,
                investment_period TEXT NOT NULL,
                expected_return TEXT NOT NULL,
                start_date TEXT NOT NULL,
                status TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS positions (
                account_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                qty INTEGER NOT NULL,
                avg_price TEXT NOT NULL,
                PRIMARY KEY (account_id, symbol)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS strategy_batches (
                date TEXT PRIMARY KEY,
                watchlist TEXT NOT NULL,
                generated_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS trade_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                symbol TEXT NOT NULL,
                action TEXT NOT NULL,
                price TEXT NOT NULL,
                qty INTEGER NOT NULL,
                ai_reason TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Account
    // -----------------------------------------------------------------------

    /// Create the account with seed capital if it does not exist yet.
    pub async fn ensure_account(
        &self,
        account_id: &str,
        initial_capital: Decimal,
    ) -> Result<(), FundError> {
        let settings = Settings::default();
        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO accounts
                (id, balance, capital, risk_profile, investment_period,
                 expected_return, start_date, status)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(account_id)
        .bind(initial_capital.to_string())
        .bind(initial_capital.to_string())
        .bind(settings.risk_profile.to_string())
        .bind(&settings.investment_period)
        .bind(settings.expected_return.to_string())
        .bind(settings.start_date.to_rfc3339())
        .bind(settings.status.to_string())
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() > 0 {
            info!(account_id, capital = %initial_capital, "Account bootstrapped");
        }
        Ok(())
    }

    /// Load the full account read model: cash, settings, holdings.
    pub async fn load_account(&self, account_id: &str) -> Result<Account, FundError> {
        let row = sqlx::query(
            "SELECT balance, capital, risk_profile, investment_period,
                    expected_return, start_date, status
             FROM accounts WHERE id = ?",
        )
        .bind(account_id)
        .fetch_one(&self.pool)
        .await?;

        let balance = parse_decimal(&row.try_get::<String, _>("balance")?)?;
        let capital = parse_decimal(&row.try_get::<String, _>("capital")?)?;
        let risk_profile: RiskProfile = row
            .try_get::<String, _>("risk_profile")?
            .parse()
            .map_err(|e: anyhow::Error| decode_msg(e.to_string()))?;
        let status: AccountStatus = row
            .try_get::<String, _>("status")?
            .parse()
            .map_err(|e: anyhow::Error| decode_msg(e.to_string()))?;

        let settings = Settings {
            risk_profile,
            investment_period: row.try_get("investment_period")?,
            expected_return: parse_decimal(&row.try_get::<String, _>("expected_return")?)?,
            start_date: parse_datetime(&row.try_get::<String, _>("start_date")?)?,
            status,
        };

        let position_rows = sqlx::query(
            "SELECT symbol, qty, avg_price FROM positions
             WHERE account_id = ? ORDER BY symbol",
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        let mut holdings = Vec::with_capacity(position_rows.len());
        for row in position_rows {
            holdings.push(Position {
                symbol: row.try_get("symbol")?,
                qty: row.try_get("qty")?,
                avg_price: parse_decimal(&row.try_get::<String, _>("avg_price")?)?,
            });
        }

        Ok(Account {
            id: account_id.to_string(),
            balance,
            capital,
            settings,
            holdings,
        })
    }

    /// Flip ACTIVE ↔ PAUSED and return the new status.
    pub async fn toggle_status(&self, account_id: &str) -> Result<AccountStatus, FundError> {
        let account = self.load_account(account_id).await?;
        let new_status = account.settings.status.toggled();

        sqlx::query("UPDATE accounts SET status = ? WHERE id = ?")
            .bind(new_status.to_string())
            .bind(account_id)
            .execute(&self.pool)
            .await?;

        info!(account_id, status = %new_status, "Account status toggled");
        Ok(new_status)
    }

    /// Persist new settings without touching cash or holdings.
    pub async fn save_settings(
        &self,
        account_id: &str,
        settings: &Settings,
    ) -> Result<(), FundError> {
        sqlx::query(
            "UPDATE accounts SET risk_profile = ?, investment_period = ?,
                expected_return = ?, start_date = ?, status = ?
             WHERE id = ?",
        )
        .bind(settings.risk_profile.to_string())
        .bind(&settings.investment_period)
        .bind(settings.expected_return.to_string())
        .bind(settings.start_date.to_rfc3339())
        .bind(settings.status.to_string())
        .bind(account_id)
        .execute(&self.pool)
        .await?;

        debug!(account_id, "Settings saved");
        Ok(())
    }

    /// Persist new settings and restart the fund: balance back to seed
    /// capital, holdings liquidated, trade log cleared, the investment
    /// period's clock restarted. One transaction.
    pub async fn reset_with_settings(
        &self,
        account_id: &str,
        settings: &Settings,
    ) -> Result<(), FundError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT capital FROM accounts WHERE id = ?")
            .bind(account_id)
            .fetch_one(&mut *tx)
            .await?;
        let capital = parse_decimal(&row.try_get::<String, _>("capital")?)?;

        sqlx::query(
            "UPDATE accounts SET balance = ?, risk_profile = ?,
                investment_period = ?, expected_return = ?,
                start_date = ?, status = ?
             WHERE id = ?",
        )
        .bind(capital.to_string())
        .bind(settings.risk_profile.to_string())
        .bind(&settings.investment_period)
        .bind(settings.expected_return.to_string())
        .bind(Utc::now().to_rfc3339())
        .bind(settings.status.to_string())
        .bind(account_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM positions WHERE account_id = ?")
            .bind(account_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM trade_logs WHERE account_id = ?")
            .bind(account_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!(account_id, "Account reset to seed capital");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Trade execution
    // -----------------------------------------------------------------------

    /// Execute one trade atomically: precondition check, cash and
    /// position mutation, and the log append all commit together or
    /// not at all. Non-positive quantities are rejected up front.
    pub async fn execute_trade(
        &self,
        account_id: &str,
        symbol: &str,
        action: TradeAction,
        price: Decimal,
        qty: i64,
        ai_reason: &str,
    ) -> Result<TradeLogEntry, FundError> {
        if qty <= 0 {
            return Err(FundError::InvalidQuantity {
                symbol: symbol.to_string(),
                qty,
            });
        }

        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT balance FROM accounts WHERE id = ?")
            .bind(account_id)
            .fetch_one(&mut *tx)
            .await?;
        let balance = parse_decimal(&row.try_get::<String, _>("balance")?)?;

        let position = sqlx::query(
            "SELECT qty, avg_price FROM positions WHERE account_id = ? AND symbol = ?",
        )
        .bind(account_id)
        .bind(symbol)
        .fetch_optional(&mut *tx)
        .await?;

        let held_qty: i64 = position
            .as_ref()
            .map(|row| row.try_get("qty"))
            .transpose()?
            .unwrap_or(0);
        let held_avg = match position.as_ref() {
            Some(row) => parse_decimal(&row.try_get::<String, _>("avg_price")?)?,
            None => Decimal::ZERO,
        };

        let new_balance = match action {
            TradeAction::Buy => {
                let total_cost = price * Decimal::from(qty);
                if total_cost > balance {
                    // Dropping the transaction rolls it back.
                    return Err(FundError::InsufficientFunds {
                        needed: total_cost,
                        available: balance,
                    });
                }

                let new_qty = held_qty + qty;
                let new_avg = (Decimal::from(held_qty) * held_avg + total_cost)
                    / Decimal::from(new_qty);

                sqlx::query(
                    "INSERT INTO positions (account_id, symbol, qty, avg_price)
                     VALUES (?, ?, ?, ?)
                     ON CONFLICT (account_id, symbol)
                     DO UPDATE SET qty = excluded.qty, avg_price = excluded.avg_price",
                )
                .bind(account_id)
                .bind(symbol)
                .bind(new_qty)
                .bind(new_avg.to_string())
                .execute(&mut *tx)
                .await?;

                balance - total_cost
            }
            TradeAction::Sell => {
                if qty > held_qty {
                    return Err(FundError::InsufficientHoldings {
                        symbol: symbol.to_string(),
                        requested: qty,
                        held: held_qty,
                    });
                }

                let remaining = held_qty - qty;
                if remaining <= 0 {
                    sqlx::query("DELETE FROM positions WHERE account_id = ? AND symbol = ?")
                        .bind(account_id)
                        .bind(symbol)
                        .execute(&mut *tx)
                        .await?;
                } else {
                    // Cost basis is unchanged by a partial exit.
                    sqlx::query(
                        "UPDATE positions SET qty = ? WHERE account_id = ? AND symbol = ?",
                    )
                    .bind(remaining)
                    .bind(account_id)
                    .bind(symbol)
                    .execute(&mut *tx)
                    .await?;
                }

                balance + price * Decimal::from(qty)
            }
        };

        sqlx::query("UPDATE accounts SET balance = ? WHERE id = ?")
            .bind(new_balance.to_string())
            .bind(account_id)
            .execute(&mut *tx)
            .await?;

        let entry = TradeLogEntry {
            timestamp: Utc::now(),
            symbol: symbol.to_string(),
            action,
            price,
            qty,
            ai_reason: ai_reason.to_string(),
        };

        sqlx::query(
            "INSERT INTO trade_logs
                (account_id, timestamp, symbol, action, price, qty, ai_reason)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(account_id)
        .bind(entry.timestamp.to_rfc3339())
        .bind(&entry.symbol)
        .bind(entry.action.to_string())
        .bind(entry.price.to_string())
        .bind(entry.qty)
        .bind(&entry.ai_reason)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            symbol,
            action = %action,
            qty,
            price = %price,
            balance = %new_balance,
            "Trade executed"
        );
        Ok(entry)
    }

    /// Most recent trades, newest first.
    pub async fn recent_trades(
        &self,
        account_id: &str,
        limit: i64,
    ) -> Result<Vec<TradeLogEntry>, FundError> {
        let rows = sqlx::query(
            "SELECT timestamp, symbol, action, price, qty, ai_reason
             FROM trade_logs WHERE account_id = ?
             ORDER BY id DESC LIMIT ?",
        )
        .bind(account_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut trades = Vec::with_capacity(rows.len());
        for row in rows {
            let action: TradeAction = row
                .try_get::<String, _>("action")?
                .parse()
                .map_err(|e: anyhow::Error| decode_msg(e.to_string()))?;
            trades.push(TradeLogEntry {
                timestamp: parse_datetime(&row.try_get::<String, _>("timestamp")?)?,
                symbol: row.try_get("symbol")?,
                action,
                price: parse_decimal(&row.try_get::<String, _>("price")?)?,
                qty: row.try_get("qty")?,
                ai_reason: row.try_get("ai_reason")?,
            });
        }
        Ok(trades)
    }

    // -----------------------------------------------------------------------
    // Strategy batches
    // -----------------------------------------------------------------------

    /// Save a day's batch. Saving again for the same date fully
    /// replaces the previous watchlist.
    pub async fn save_batch(&self, batch: &StrategyBatch) -> Result<(), FundError> {
        let watchlist = serde_json::to_string(&batch.watchlist)
            .map_err(|e| FundError::Store(sqlx::Error::Encode(Box::new(e))))?;

        sqlx::query(
            "INSERT INTO strategy_batches (date, watchlist, generated_at)
             VALUES (?, ?, ?)
             ON CONFLICT (date)
             DO UPDATE SET watchlist = excluded.watchlist,
                           generated_at = excluded.generated_at",
        )
        .bind(batch.date.format(DATE_FMT).to_string())
        .bind(watchlist)
        .bind(batch.generated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        info!(date = %batch.date, picks = batch.watchlist.len(), "Strategy batch saved");
        Ok(())
    }

    /// Load the batch for a date, `None` when no strategist run exists.
    pub async fn load_batch(&self, date: NaiveDate) -> Result<Option<StrategyBatch>, FundError> {
        let row = sqlx::query(
            "SELECT watchlist, generated_at FROM strategy_batches WHERE date = ?",
        )
        .bind(date.format(DATE_FMT).to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let watchlist = serde_json::from_str(&row.try_get::<String, _>("watchlist")?)
            .map_err(decode_err)?;

        Ok(Some(StrategyBatch {
            date,
            watchlist,
            generated_at: parse_datetime(&row.try_get::<String, _>("generated_at")?)?,
        }))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
