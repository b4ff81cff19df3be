//! Card field extraction through a hosted LLM
//!
//! The extractor receives the visible text of a product page and returns a
//! flat JSON object keyed by the field names in `card_detail::keys`. Errors
//! keep the raw model output so the audit log can store it.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::Write as _;
use thiserror::Error;
use tracing::debug;

use crate::domain::card_detail::{NOT_MENTIONED, keys};
use crate::infrastructure::config::LlmConfig;

#[derive(Debug, Error)]
pub enum LlmError {
    /// Missing API key or invalid settings
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection failure or timeout
    #[error("Network error: {0}")]
    Network(String),

    /// Non-2xx response from the provider
    #[error("API error: {message}")]
    Api { message: String, raw_response: String },

    /// Model output was not a JSON object
    #[error("Parse error: {message}")]
    Parse { message: String, raw_response: String },
}

impl LlmError {
    /// Whatever the provider sent back, for the audit log.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Self::Api { raw_response, .. } | Self::Parse { raw_response, .. } => Some(raw_response),
            Self::Config(_) | Self::Network(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LlmExtraction {
    pub fields: Map<String, Value>,
    pub raw_response: String,
}

#[async_trait]
pub trait CardFieldExtractor: Send + Sync {
    async fn extract(&self, page_text: &str) -> Result<LlmExtraction, LlmError>;
}

const SECTIONS: &[(&str, &[&str])] = &[
    ("Card Identification", &[keys::CARD_NAME, keys::BANK_NAME]),
    (
        "Eligibility & Conditions",
        &[
            keys::MINIMUM_SALARY,
            keys::ANNUAL_FEE,
            keys::MINIMUM_SPEND,
            keys::BALANCE_TRANSFER,
            keys::FOREIGN_CURRENCY_FEE,
        ],
    ),
    (
        "Rewards & Earnings",
        &[keys::WELCOME_BONUS, keys::CASHBACK_RATES, keys::POINTS_EARNING, keys::COBRAND_REWARDS],
    ),
    (
        "Travel Perks",
        &[keys::LOUNGE_ACCESS, keys::TRAVEL_INSURANCE, keys::AIRPORT_TRANSFERS, keys::HOTEL_DISCOUNTS],
    ),
    (
        "Lifestyle & Entertainment",
        &[keys::CINEMA_OFFERS, keys::DINING_DISCOUNTS, keys::GOLF_PRIVILEGES, keys::VALET_PARKING],
    ),
    (
        "Purchase & Protection Benefits",
        &[keys::PURCHASE_PROTECTION, keys::EXTENDED_WARRANTY, keys::OTHER_BENEFITS],
    ),
];

/// Instruction sent with every page.
pub fn build_prompt(page_text: &str) -> String {
    let mut prompt = String::from(
        "You are an AI assistant specialized in extracting credit card information from website text.\n\
         From the following text content of a credit card webpage, extract the data points for the following categories.\n",
    );
    let _ = writeln!(prompt, "If a specific piece of information is not found, state \"{NOT_MENTIONED}\".\n");

    for (section, fields) in SECTIONS {
        let _ = writeln!(prompt, "**{section}:**");
        for field in *fields {
            let _ = writeln!(prompt, "- {field}");
        }
        prompt.push('\n');
    }

    prompt.push_str(
        "**Output Format:** Provide the extracted data as a single, flat JSON object using exactly the names above as keys.\n\
         ```json\n{\n  \"Card Name\": \"Example Card\",\n  \"Bank Name\": \"Example Bank\"\n}\n```\n---\n\
         Webpage Text Content:\n",
    );
    prompt.push_str(page_text);
    prompt
}

/// Strip an optional Markdown code fence around the model's JSON.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.trim().strip_suffix("```").unwrap_or(rest).trim()
}

/// Parse model output into the field map.
pub fn parse_model_output(raw: &str) -> Result<Map<String, Value>, LlmError> {
    let parse_error = |message: String| LlmError::Parse {
        message,
        raw_response: raw.to_string(),
    };

    match serde_json::from_str::<Value>(strip_code_fence(raw)) {
        Ok(Value::Object(fields)) if !fields.is_empty() => Ok(fields),
        Ok(Value::Object(_)) => Err(parse_error("model returned an empty object".into())),
        Ok(other) => Err(parse_error(format!("expected a JSON object, got {}", json_kind(&other)))),
        Err(e) => Err(parse_error(format!("invalid JSON: {e}"))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

/// Google Generative Language (Gemini) REST client.
#[derive(Clone)]
pub struct GeminiClient {
    http_client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| LlmError::Config("LLM API key not set (llm.api_key or GEMINI_API_KEY)".into()))?;

        let http_client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| LlmError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.trim_start_matches("models/").to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        };

        let response = self
            .http_client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| LlmError::Network(e.to_string()))?;
        if !status.is_success() {
            return Err(LlmError::Api {
                message: format!("{} returned {status}", self.model),
                raw_response: body,
            });
        }

        let parsed: GenerateResponse = serde_json::from_str(&body).map_err(|e| LlmError::Parse {
            message: format!("unexpected response envelope: {e}"),
            raw_response: body.clone(),
        })?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(LlmError::Parse {
                message: "response contained no text".into(),
                raw_response: body,
            });
        }
        Ok(text.trim().to_string())
    }
}

#[async_trait]
impl CardFieldExtractor for GeminiClient {
    async fn extract(&self, page_text: &str) -> Result<LlmExtraction, LlmError> {
        debug!("Sending {} chars of page text to {}", page_text.len(), self.model);
        let raw_response = self.generate(&build_prompt(page_text)).await?;
        let fields = parse_model_output(&raw_response)?;
        Ok(LlmExtraction { fields, raw_response })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fences_are_stripped() {
        assert_eq!(strip_code_fence("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("  {\"a\": 1} "), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```json {\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn object_output_is_accepted() {
        let fields = parse_model_output("```json\n{\"Card Name\": \"Gold\", \"Annual Fee\": \"Free\"}\n```").unwrap();
        assert_eq!(fields["Card Name"], "Gold");
    }

    #[test]
    fn non_object_output_keeps_raw_text() {
        for raw in ["[1, 2]", "I could not find anything", "{}"] {
            let err = parse_model_output(raw).unwrap_err();
            assert_eq!(err.raw_response(), Some(raw));
        }
    }

    #[test]
    fn prompt_lists_every_field_and_the_page() {
        let prompt = build_prompt("PAGE BODY");
        for key in keys::ALL {
            assert!(prompt.contains(&format!("- {key}")), "missing {key}");
        }
        assert!(prompt.ends_with("PAGE BODY"));
    }

    #[test]
    fn missing_api_key_is_a_config_error() {
        let config = LlmConfig {
            api_key: None,
            ..LlmConfig::default()
        };
        assert!(matches!(GeminiClient::new(&config), Err(LlmError::Config(_))));
    }
}
