//! MAVERICK: Autonomous AI Paper-Trading Fund
//!
//! Entry point. Loads configuration, initialises structured logging,
//! bootstraps the account, and dispatches one of three modes:
//! `strategist` (pre-market screening), `trader` (execute the day's
//! batch), or `serve` (the read API).

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use maverick::api::{self, ApiState};
use maverick::config::AppConfig;
use maverick::engine::strategist::Strategist;
use maverick::engine::trader::Trader;
use maverick::llm::groq::GroqClient;
use maverick::llm::Oracle;
use maverick::market::universe::UniverseProvider;
use maverick::market::yahoo::YahooClient;
use maverick::market::MarketData;
use maverick::store::Store;
use maverick::types::{d, FundError};

const BANNER: &str = r#"
 __  __   ___   _____ ___ ___ ___ ___ _  __
|  \/  | /_\ \ / / __| _ \_ _/ __| |/ /
| |\/| |/ _ \ V /| _||   /| | (__| ' <
|_|  |_/_/ \_\_/ |___|_|_\___\___|_|\_\

  Market Analysis, Verdicts & Execution — Risk-Controlled Kernel
  v0.1.0 — Autonomous Fund
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = AppConfig::load("config.toml")?;
    init_logging();

    let mode = std::env::args().nth(1).unwrap_or_else(|| "trader".into());

    println!("{BANNER}");
    info!(
        fund = %cfg.fund.name,
        account = %cfg.fund.account_id,
        mode = %mode,
        "MAVERICK starting up"
    );

    // -- Shared components -------------------------------------------------

    let store = Arc::new(
        Store::open(&cfg.fund.db_path)
            .await
            .context("Failed to open database")?,
    );
    store
        .ensure_account(&cfg.fund.account_id, d(cfg.fund.initial_capital))
        .await
        .context("Failed to bootstrap account")?;

    let market: Arc<dyn MarketData> = Arc::new(YahooClient::new()?);

    match mode.as_str() {
        "strategist" => {
            let oracle = build_oracle(&cfg)?;
            let universe = UniverseProvider::new(
                reqwest::Client::builder()
                    .timeout(Duration::from_secs(30))
                    .build()
                    .context("Failed to build universe HTTP client")?,
                cfg.data.universe_url.clone(),
            );

            let strategist = Strategist::new(
                Arc::clone(&store),
                Arc::clone(&market),
                oracle,
                cfg.fund.account_id.clone(),
                cfg.strategist.scan_limit,
                Duration::from_secs(cfg.strategist.pace_secs),
            );

            let symbols = universe.symbols().await;
            let report = strategist.run_cycle(symbols).await?;
            info!(
                screened = report.screened,
                candidates = report.candidates,
                picks = report.picks,
                "Strategist run finished"
            );
        }
        "trader" => {
            let oracle = build_oracle(&cfg)?;
            let trader = Trader::new(
                Arc::clone(&store),
                Arc::clone(&market),
                oracle,
                cfg.fund.account_id.clone(),
            );

            match trader.run_cycle().await {
                Ok(report) => info!(
                    executed = report.executed,
                    skipped = report.skipped,
                    vetoed = report.vetoed,
                    "Trader run finished"
                ),
                Err(FundError::PeriodExpired {
                    elapsed_days,
                    days_limit,
                }) => warn!(
                    elapsed_days,
                    days_limit, "Investment period over — fund is done trading"
                ),
                Err(e) => return Err(e.into()),
            }
        }
        "serve" => {
            if !cfg.api.enabled {
                anyhow::bail!("API is disabled in config.toml");
            }
            let state = Arc::new(ApiState {
                store: Arc::clone(&store),
                market: Arc::clone(&market),
                account_id: cfg.fund.account_id.clone(),
            });
            api::serve(state, cfg.api.port).await?;
        }
        other => {
            anyhow::bail!("Unknown mode '{other}'. Use: strategist | trader | serve");
        }
    }

    Ok(())
}

/// Build the Groq oracle from config + environment.
fn build_oracle(cfg: &AppConfig) -> Result<Arc<dyn Oracle>> {
    let api_key = AppConfig::resolve_env(&cfg.llm.api_key_env)?;
    let client = GroqClient::new(
        api_key.into(),
        Some(cfg.llm.model.clone()),
        Some(cfg.llm.max_tokens),
    )?;
    info!(model = %cfg.llm.model, "Oracle ready");
    Ok(Arc::new(client))
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("maverick=info"));

    let json_logging = std::env::var("MAVERICK_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
