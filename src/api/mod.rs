//! Read API: Axum web server over the fund's state.
//!
//! Serves portfolio stats (with live valuation), the trade log, and
//! the two control endpoints: pause/resume and settings-with-reset.
//! CORS enabled for local dashboards.

use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::market::{Lookback, MarketData};
use crate::store::Store;
use crate::types::{d, FundError, RiskProfile, Settings};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

pub struct ApiState {
    pub store: Arc<Store>,
    pub market: Arc<dyn MarketData>,
    pub account_id: String,
}

pub type AppState = Arc<ApiState>;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HoldingView {
    pub symbol: String,
    pub qty: i64,
    pub avg_price: Decimal,
    /// Live price, absent when the quote could not be fetched.
    pub live_price: Option<f64>,
    /// Valued at the live price, or at cost when no quote is available.
    pub market_value: Decimal,
    pub unrealized_pnl: Decimal,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub account_id: String,
    pub balance: Decimal,
    pub capital: Decimal,
    pub invested: Decimal,
    pub total_equity: Decimal,
    pub total_pnl: Decimal,
    pub status: String,
    pub risk_profile: String,
    pub investment_period: String,
    pub expected_return: Decimal,
    pub start_date: DateTime<Utc>,
    pub holdings: Vec<HoldingView>,
}

#[derive(Debug, Serialize)]
pub struct TradeView {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub action: String,
    pub price: Decimal,
    pub qty: i64,
    pub ai_reason: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct SaveSettingsRequest {
    pub risk_profile: String,
    pub investment_period: String,
    pub expected_return: f64,
    /// When set, the fund restarts: cash back to seed capital,
    /// holdings and trade log cleared, period clock restarted.
    #[serde(default)]
    pub reset: bool,
}

type ApiError = (StatusCode, Json<ErrorBody>);

/// A missing account row reads as 404; anything else from the store
/// is a 500, so the caller can tell "no data" from "storage down".
fn store_error(e: FundError) -> ApiError {
    let status = match &e {
        FundError::Store(sqlx::Error::RowNotFound) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorBody {
            error: e.to_string(),
        }),
    )
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/stats
pub async fn get_stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, ApiError> {
    let account = state
        .store
        .load_account(&state.account_id)
        .await
        .map_err(store_error)?;

    let mut holdings = Vec::with_capacity(account.holdings.len());
    let mut total_market_value = Decimal::ZERO;

    for position in &account.holdings {
        let live_price = match state
            .market
            .fetch_snapshot(&position.symbol, Lookback::FiveDaysIntraday)
            .await
        {
            Ok(snapshot) => snapshot.latest_close(),
            Err(e) => {
                warn!(symbol = %position.symbol, error = %e, "Live quote unavailable, valuing at cost");
                None
            }
        };

        let market_value = match live_price {
            Some(price) => d(price) * Decimal::from(position.qty),
            None => position.cost(),
        };
        total_market_value += market_value;

        holdings.push(HoldingView {
            symbol: position.symbol.clone(),
            qty: position.qty,
            avg_price: position.avg_price,
            live_price,
            market_value,
            unrealized_pnl: market_value - position.cost(),
        });
    }

    let total_equity = account.balance + total_market_value;

    Ok(Json(StatsResponse {
        account_id: account.id.clone(),
        balance: account.balance,
        capital: account.capital,
        invested: account.holdings_cost(),
        total_equity,
        total_pnl: total_equity - account.capital,
        status: account.settings.status.to_string(),
        risk_profile: account.settings.risk_profile.to_string(),
        investment_period: account.settings.investment_period.clone(),
        expected_return: account.settings.expected_return,
        start_date: account.settings.start_date,
        holdings,
    }))
}

/// GET /api/trades
pub async fn get_trades(State(state): State<AppState>) -> Result<Json<Vec<TradeView>>, ApiError> {
    let trades = state
        .store
        .recent_trades(&state.account_id, 50)
        .await
        .map_err(store_error)?;

    Ok(Json(
        trades
            .into_iter()
            .map(|t| TradeView {
                timestamp: t.timestamp,
                symbol: t.symbol,
                action: t.action.to_string(),
                price: t.price,
                qty: t.qty,
                ai_reason: t.ai_reason,
            })
            .collect(),
    ))
}

/// POST /api/toggle_status
pub async fn toggle_status(
    State(state): State<AppState>,
) -> Result<Json<StatusResponse>, ApiError> {
    let status = state
        .store
        .toggle_status(&state.account_id)
        .await
        .map_err(store_error)?;

    Ok(Json(StatusResponse {
        status: status.to_string(),
    }))
}

/// POST /api/save_settings
pub async fn save_settings(
    State(state): State<AppState>,
    Json(req): Json<SaveSettingsRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let risk_profile: RiskProfile = req.risk_profile.parse().map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                error: format!("unknown risk profile: {}", req.risk_profile),
            }),
        )
    })?;

    let account = state
        .store
        .load_account(&state.account_id)
        .await
        .map_err(store_error)?;

    let settings = Settings {
        risk_profile,
        investment_period: req.investment_period,
        expected_return: d(req.expected_return),
        start_date: account.settings.start_date,
        status: account.settings.status,
    };

    if req.reset {
        state
            .store
            .reset_with_settings(&state.account_id, &settings)
            .await
            .map_err(store_error)?;
    } else {
        state
            .store
            .save_settings(&state.account_id, &settings)
            .await
            .map_err(store_error)?;
    }

    Ok(Json(StatusResponse {
        status: if req.reset { "reset" } else { "saved" }.to_string(),
    }))
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Router & server
// ---------------------------------------------------------------------------

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/stats", get(get_stats))
        .route("/api/trades", get(get_trades))
        .route("/api/toggle_status", post(toggle_status))
        .route("/api/save_settings", post(save_settings))
        .route("/health", get(health))
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until shutdown. Blocks the calling task.
pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let app = build_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    info!(port, "API server starting on http://localhost:{port}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
