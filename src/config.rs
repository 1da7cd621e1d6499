//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys) are referenced by env-var name in the config and
//! resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub fund: FundConfig,
    pub strategist: StrategistConfig,
    pub llm: LlmConfig,
    pub data: DataConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FundConfig {
    pub name: String,
    /// Fixed account id; this fund manages exactly one account.
    pub account_id: String,
    /// Seed capital used when bootstrapping a fresh database.
    pub initial_capital: f64,
    /// SQLite database path, e.g. "maverick.db".
    pub db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StrategistConfig {
    /// How many universe symbols to screen per run (holdings are always
    /// screened on top of this).
    #[serde(default = "default_scan_limit")]
    pub scan_limit: usize,
    /// Pause between oracle calls, provider rate-limit etiquette.
    #[serde(default = "default_pace_secs")]
    pub pace_secs: u64,
}

fn default_scan_limit() -> usize {
    50
}

fn default_pace_secs() -> u64 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    pub model: String,
    pub api_key_env: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_max_tokens() -> u32 {
    350
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    /// Exchange symbol-list CSV endpoint; a fixed fallback list is used
    /// when this fetch fails.
    #[serde(default)]
    pub universe_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    pub enabled: bool,
    pub port: u16,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [fund]
            name = "MAVERICK-001"
            account_id = "user_001"
            initial_capital = 1000.0
            db_path = "maverick.db"

            [strategist]
            scan_limit = 25
            pace_secs = 1

            [llm]
            model = "llama-3.3-70b-versatile"
            api_key_env = "GROQ_API_KEY"
            max_tokens = 400

            [data]
            universe_url = "https://example.com/equities.csv"

            [api]
            enabled = true
            port = 5000
        "#;
        let cfg: AppConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.fund.account_id, "user_001");
        assert_eq!(cfg.strategist.scan_limit, 25);
        assert_eq!(cfg.llm.max_tokens, 400);
        assert_eq!(cfg.api.port, 5000);
        assert!(cfg.data.universe_url.is_some());
    }

    #[test]
    fn test_defaults_applied() {
        let toml = r#"
            [fund]
            name = "MAVERICK-001"
            account_id = "user_001"
            initial_capital = 1000.0
            db_path = "maverick.db"

            [strategist]

            [llm]
            model = "llama-3.3-70b-versatile"
            api_key_env = "GROQ_API_KEY"

            [data]

            [api]
            enabled = false
            port = 5000
        "#;
        let cfg: AppConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.strategist.scan_limit, 50);
        assert_eq!(cfg.strategist.pace_secs, 2);
        assert_eq!(cfg.llm.max_tokens, 350);
        assert!(cfg.data.universe_url.is_none());
    }
}
