//! Groq LLM integration.
//!
//! Implements the `Oracle` trait over Groq's OpenAI-compatible chat
//! completions endpoint. Handles prompt construction, JSON-mode
//! response parsing, and rate-limit retry.

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{NewsVerdict, Oracle};
use crate::market::{Headline, StockSnapshot};
use crate::screener::Candidate;
use crate::types::{Decision, FundError, Position, Recommendation, Settings};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const GROQ_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";
const DEFAULT_MAX_TOKENS: u32 = 350;

/// Retries on HTTP 429. Other failures are not retried.
const MAX_RETRIES: u32 = 3;

/// Fixed delay between rate-limit retries (ms).
const RETRY_DELAY_MS: u64 = 2000;

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ChatMessage>,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: String,
}

/// The JSON object the model is instructed to return for a
/// recommendation. The symbol is ours, never the model's.
#[derive(Debug, Deserialize)]
struct RawRecommendation {
    decision: String,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    technical_trend: String,
    #[serde(default)]
    fundamental_health: String,
    #[serde(default)]
    sentiment_score: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct GroqClient {
    http: Client,
    api_key: SecretString,
    model: String,
    max_tokens: u32,
}

impl GroqClient {
    pub fn new(
        api_key: SecretString,
        model: Option<String>,
        max_tokens: Option<u32>,
    ) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build Groq HTTP client: {e}"))?;

        Ok(Self {
            http,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_tokens: max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        })
    }

    /// Send a chat completion, retrying only on HTTP 429 with a fixed
    /// delay. Returns the first choice's message content.
    async fn call_api(
        &self,
        system: &str,
        user_message: &str,
        json_mode: bool,
    ) -> Result<String, FundError> {
        let request = ChatRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user_message.to_string(),
                },
            ],
            temperature: 0.2,
            response_format: json_mode.then(|| ResponseFormat {
                format_type: "json_object".to_string(),
            }),
        };

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                debug!(attempt, delay_ms = RETRY_DELAY_MS, "Retrying Groq API call");
                tokio::time::sleep(std::time::Duration::from_millis(RETRY_DELAY_MS)).await;
            }

            let response = self
                .http
                .post(GROQ_API_URL)
                .bearer_auth(self.api_key.expose_secret())
                .json(&request)
                .send()
                .await
                .map_err(|e| FundError::OracleProvider(format!("request failed: {e}")))?;

            let status = response.status();

            if status.as_u16() == 429 {
                warn!(attempt, "Groq rate limit hit");
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(FundError::OracleProvider(format!("HTTP {status}: {body}")));
            }

            let body: ChatResponse = response
                .json()
                .await
                .map_err(|e| FundError::OracleProvider(format!("response read failed: {e}")))?;

            return body
                .choices
                .into_iter()
                .next()
                .map(|c| c.message.content)
                .ok_or_else(|| FundError::OracleProvider("empty choices".to_string()));
        }

        Err(FundError::OracleProvider(format!(
            "rate limited after {MAX_RETRIES} retries"
        )))
    }

    // -- Prompts ----------------------------------------------------------

    /// Strategy framing derived from the target return.
    pub fn strategy_style(expected_return: Decimal) -> &'static str {
        if expected_return >= Decimal::from(50) {
            "aggressive high-growth: favor volatile movers with large upside"
        } else if expected_return >= Decimal::from(20) {
            "growth-oriented: favor fundamentally sound stocks with momentum"
        } else {
            "conservative: favor stable large-caps and capital preservation"
        }
    }

    pub fn recommendation_system_prompt() -> &'static str {
        "You are the portfolio strategist of an autonomous stock fund. \
         Analyze the provided stock data and respond with a single JSON object, \
         no prose, with exactly these keys:\n\
         {\"decision\": \"BUY|SELL|WAIT|AVOID\", \
         \"reasoning\": \"one or two sentences\", \
         \"technical_trend\": \"Bullish|Bearish|Neutral\", \
         \"fundamental_health\": \"Strong|Average|Weak\", \
         \"sentiment_score\": \"Positive|Negative|Neutral\"}\n\
         Rules:\n\
         1. SELL is only valid when the portfolio already holds the stock.\n\
         2. AVOID means the stock is unattractive at any price right now.\n\
         3. WAIT means attractive but not at the current setup.\n\
         4. Base the decision on the technicals, fundamentals, and news given. \
         Do not invent data."
    }

    pub fn build_recommendation_prompt(
        candidate: &Candidate,
        snapshot: &StockSnapshot,
        holding: Option<&Position>,
        settings: &Settings,
    ) -> String {
        let ind = &candidate.indicators;
        let mut prompt = String::with_capacity(1500);

        prompt.push_str(&format!("STOCK: {}\n", candidate.symbol));
        prompt.push_str(&format!("SCREENED AS: {}\n", candidate.reason));

        prompt.push_str("\nTECHNICALS:\n");
        prompt.push_str(&format!("- Last close: {:.2}\n", ind.latest_close));
        prompt.push_str(&format!("- RSI(14): {:.1}\n", ind.rsi));
        prompt.push_str(&format!("- SMA(50): {:.2}\n", ind.sma_50));
        prompt.push_str(&format!(
            "- Volume vs average: {:.2}x\n",
            ind.volume_ratio
        ));

        prompt.push_str("\nFUNDAMENTALS:\n");
        let f = &snapshot.fundamentals;
        match f.pe_ratio {
            Some(pe) => prompt.push_str(&format!("- P/E: {pe:.1}\n")),
            None => prompt.push_str("- P/E: unavailable\n"),
        }
        if let Some(de) = f.debt_to_equity {
            prompt.push_str(&format!("- Debt/Equity: {de:.1}\n"));
        }
        if let Some(m) = f.profit_margins {
            prompt.push_str(&format!("- Profit margin: {:.1}%\n", m * 100.0));
        }
        if let Some(sector) = &f.sector {
            prompt.push_str(&format!("- Sector: {sector}\n"));
        }

        if snapshot.news.is_empty() {
            prompt.push_str("\nRECENT NEWS: none available\n");
        } else {
            prompt.push_str("\nRECENT NEWS:\n");
            for h in &snapshot.news {
                match &h.publisher {
                    Some(p) => prompt.push_str(&format!("- {} ({p})\n", h.title)),
                    None => prompt.push_str(&format!("- {}\n", h.title)),
                }
            }
        }

        prompt.push_str("\nPORTFOLIO CONTEXT:\n");
        match holding {
            Some(pos) => {
                prompt.push_str(&format!(
                    "- Currently held: {} shares at avg {:.2}. SELL is available.\n",
                    pos.qty, pos.avg_price
                ));
            }
            None => {
                prompt.push_str("- Not currently held. SELL is NOT available.\n");
            }
        }
        prompt.push_str(&format!(
            "- Risk profile: {}\n",
            settings.risk_profile
        ));
        prompt.push_str(&format!(
            "- Investment horizon: {}\n",
            settings.investment_period
        ));
        prompt.push_str(&format!(
            "- Target return: {}% — strategy stance is {}\n",
            settings.expected_return,
            Self::strategy_style(settings.expected_return)
        ));

        prompt.push_str("\nRespond with the JSON object only.\n");
        prompt
    }

    pub fn news_system_prompt() -> &'static str {
        "You are a risk officer vetting a stock purchase against breaking news. \
         Respond with exactly one word: FATAL if any headline indicates fraud, \
         insolvency, a regulatory ban, or a similar company-threatening event; \
         otherwise CLEAR."
    }

    pub fn build_news_prompt(symbol: &str, headlines: &[Headline]) -> String {
        let mut prompt = String::with_capacity(400);
        prompt.push_str(&format!("Headlines for {symbol}:\n"));
        for h in headlines {
            prompt.push_str(&format!("- {}\n", h.title));
        }
        prompt.push_str("\nFATAL or CLEAR?\n");
        prompt
    }

    // -- Parsers ----------------------------------------------------------

    /// Parse the model's JSON into a recommendation for `symbol`.
    ///
    /// Tolerates markdown code fences around the object. Anything that
    /// does not yield a valid decision is malformed, never a WAIT.
    pub fn parse_recommendation(symbol: &str, text: &str) -> Result<Recommendation, FundError> {
        let json = Self::strip_fences(text);

        let raw: RawRecommendation = serde_json::from_str(json)
            .map_err(|e| FundError::OracleMalformed(format!("invalid JSON: {e}")))?;

        let decision: Decision = serde_json::from_value(serde_json::Value::String(
            raw.decision.trim().to_uppercase(),
        ))
        .map_err(|_| {
            FundError::OracleMalformed(format!("unknown decision: {}", raw.decision))
        })?;

        Ok(Recommendation {
            symbol: symbol.to_string(),
            decision,
            reasoning: raw.reasoning,
            technical_trend: raw.technical_trend,
            fundamental_health: raw.fundamental_health,
            sentiment_score: raw.sentiment_score,
        })
    }

    /// Parse the one-word news verdict. Anything that is not an
    /// explicit FATAL reads as CLEAR.
    pub fn parse_verdict(text: &str) -> NewsVerdict {
        if text.to_uppercase().contains("FATAL") {
            NewsVerdict::Fatal
        } else {
            NewsVerdict::Clear
        }
    }

    fn strip_fences(text: &str) -> &str {
        let trimmed = text.trim();
        let trimmed = trimmed
            .strip_prefix("```json")
            .or_else(|| trimmed.strip_prefix("```"))
            .unwrap_or(trimmed);
        trimmed.strip_suffix("```").unwrap_or(trimmed).trim()
    }
}

// ---------------------------------------------------------------------------
// Oracle implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl Oracle for GroqClient {
    async fn recommend(
        &self,
        candidate: &Candidate,
        snapshot: &StockSnapshot,
        holding: Option<&Position>,
        settings: &Settings,
    ) -> Result<Recommendation, FundError> {
        let system = Self::recommendation_system_prompt();
        let user_msg = Self::build_recommendation_prompt(candidate, snapshot, holding, settings);

        debug!(symbol = %candidate.symbol, model = %self.model, "Requesting recommendation");

        let response = self.call_api(system, &user_msg, true).await?;
        let rec = Self::parse_recommendation(&candidate.symbol, &response)?;

        info!(
            symbol = %rec.symbol,
            decision = %rec.decision,
            reason = %candidate.reason,
            "Recommendation received"
        );

        Ok(rec)
    }

    async fn news_verdict(
        &self,
        symbol: &str,
        headlines: &[Headline],
    ) -> Result<NewsVerdict, FundError> {
        if headlines.is_empty() {
            return Ok(NewsVerdict::Clear);
        }

        let system = Self::news_system_prompt();
        let user_msg = Self::build_news_prompt(symbol, headlines);

        let response = self.call_api(system, &user_msg, false).await?;
        let verdict = Self::parse_verdict(&response);

        debug!(symbol, fatal = verdict.is_fatal(), "News verdict received");
        Ok(verdict)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::Fundamentals;
    use crate::screener::{Indicators, ScreenReason};
    use crate::types::d;
    use rust_decimal_macros::dec;

    fn candidate() -> Candidate {
        Candidate {
            symbol: "TCS.NS".into(),
            reason: ScreenReason::Oversold,
            indicators: Indicators {
                rsi: 26.3,
                sma_50: 3600.0,
                volume_ratio: 1.1,
                latest_close: 3450.0,
            },
        }
    }

    fn snapshot() -> StockSnapshot {
        StockSnapshot {
            symbol: "TCS.NS".into(),
            history: Vec::new(),
            fundamentals: Fundamentals {
                pe_ratio: Some(28.5),
                sector: Some("Technology".into()),
                ..Fundamentals::default()
            },
            news: vec![Headline {
                title: "Large deal win announced".into(),
                publisher: Some("Mint".into()),
            }],
        }
    }

    // -- Strategy framing --

    #[test]
    fn test_strategy_style_bands() {
        assert!(GroqClient::strategy_style(dec!(60)).contains("aggressive"));
        assert!(GroqClient::strategy_style(dec!(50)).contains("aggressive"));
        assert!(GroqClient::strategy_style(dec!(49)).contains("growth"));
        assert!(GroqClient::strategy_style(dec!(20)).contains("growth"));
        assert!(GroqClient::strategy_style(dec!(19)).contains("conservative"));
        assert!(GroqClient::strategy_style(dec!(5)).contains("conservative"));
    }

    // -- Prompt construction --

    #[test]
    fn test_recommendation_prompt_without_holding() {
        let prompt = GroqClient::build_recommendation_prompt(
            &candidate(),
            &snapshot(),
            None,
            &Settings::default(),
        );
        assert!(prompt.contains("TCS.NS"));
        assert!(prompt.contains("RSI(14): 26.3"));
        assert!(prompt.contains("oversold"));
        assert!(prompt.contains("SELL is NOT available"));
        assert!(prompt.contains("Large deal win"));
        assert!(prompt.contains("P/E: 28.5"));
    }

    #[test]
    fn test_recommendation_prompt_with_holding() {
        let pos = Position {
            symbol: "TCS.NS".into(),
            qty: 4,
            avg_price: d(3300.0),
        };
        let prompt = GroqClient::build_recommendation_prompt(
            &candidate(),
            &snapshot(),
            Some(&pos),
            &Settings::default(),
        );
        assert!(prompt.contains("4 shares"));
        assert!(prompt.contains("SELL is available"));
    }

    #[test]
    fn test_news_prompt() {
        let headlines = vec![Headline {
            title: "Regulator opens probe".into(),
            publisher: None,
        }];
        let prompt = GroqClient::build_news_prompt("INFY.NS", &headlines);
        assert!(prompt.contains("INFY.NS"));
        assert!(prompt.contains("Regulator opens probe"));
        assert!(prompt.contains("FATAL or CLEAR"));
    }

    // -- Recommendation parsing --

    #[test]
    fn test_parse_recommendation() {
        let text = r#"{"decision": "BUY", "reasoning": "Oversold bounce setup",
                       "technical_trend": "Bullish", "fundamental_health": "Strong",
                       "sentiment_score": "Positive"}"#;
        let rec = GroqClient::parse_recommendation("TCS.NS", text).unwrap();
        assert_eq!(rec.decision, Decision::Buy);
        assert_eq!(rec.symbol, "TCS.NS");
        assert_eq!(rec.technical_trend, "Bullish");
    }

    #[test]
    fn test_parse_recommendation_fenced() {
        let text = "```json\n{\"decision\": \"WAIT\", \"reasoning\": \"x\"}\n```";
        let rec = GroqClient::parse_recommendation("X.NS", text).unwrap();
        assert_eq!(rec.decision, Decision::Wait);
    }

    #[test]
    fn test_parse_recommendation_lowercase_decision() {
        let text = r#"{"decision": "sell", "reasoning": "take profit"}"#;
        let rec = GroqClient::parse_recommendation("X.NS", text).unwrap();
        assert_eq!(rec.decision, Decision::Sell);
    }

    #[test]
    fn test_parse_recommendation_garbage_is_malformed() {
        let err = GroqClient::parse_recommendation("X.NS", "I think you should buy!").unwrap_err();
        assert!(matches!(err, FundError::OracleMalformed(_)));
    }

    #[test]
    fn test_parse_recommendation_unknown_decision_is_malformed() {
        let text = r#"{"decision": "HODL", "reasoning": "diamond hands"}"#;
        let err = GroqClient::parse_recommendation("X.NS", text).unwrap_err();
        assert!(matches!(err, FundError::OracleMalformed(_)));
    }

    #[test]
    fn test_parse_recommendation_symbol_is_ours() {
        // The model cannot redirect a recommendation to another symbol.
        let text = r#"{"decision": "BUY", "reasoning": "x", "symbol": "OTHER.NS"}"#;
        let rec = GroqClient::parse_recommendation("TCS.NS", text).unwrap();
        assert_eq!(rec.symbol, "TCS.NS");
    }

    // -- Verdict parsing --

    #[test]
    fn test_parse_verdict() {
        assert_eq!(GroqClient::parse_verdict("FATAL"), NewsVerdict::Fatal);
        assert_eq!(GroqClient::parse_verdict("fatal."), NewsVerdict::Fatal);
        assert_eq!(GroqClient::parse_verdict("CLEAR"), NewsVerdict::Clear);
        // Anything non-explicit reads as clear
        assert_eq!(GroqClient::parse_verdict("hmm, unsure"), NewsVerdict::Clear);
        assert_eq!(GroqClient::parse_verdict(""), NewsVerdict::Clear);
    }

    // -- Client construction --

    #[test]
    fn test_client_defaults() {
        let client = GroqClient::new("test-key".to_string().into(), None, None).unwrap();
        assert_eq!(client.model_name(), DEFAULT_MODEL);
        assert_eq!(client.max_tokens, DEFAULT_MAX_TOKENS);
    }
}
