//! LLM client for AI-backed extraction.
//!
//! Uses a local LLM (via Ollama) to pull reward items out of pages no
//! rule-driven extractor recognises.

mod config;
mod prompts;

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub use config::LlmConfig;
use prompts::EXTRACT_ITEMS_PROMPT;

/// One entry as the model reports it, before validation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawLlmItem {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ItemsEnvelope {
    #[serde(default)]
    items: Vec<RawLlmItem>,
}

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("API error: {0}")]
    Api(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("LLM is disabled")]
    Disabled,
}

/// Ollama API request format.
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
    format: &'static str,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

/// Ollama API response format.
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

pub struct LlmClient {
    config: LlmConfig,
    client: Client,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Connection(e.to_string()))?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Check if the LLM service is reachable.
    pub async fn is_available(&self) -> bool {
        if !self.config.enabled {
            return false;
        }
        let url = format!("{}/api/tags", self.config.base_url());
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    /// Ask the model for the items on a page.
    ///
    /// `kinds` is a human phrase such as "reward links" or "promo codes".
    pub async fn extract_items(
        &self,
        page_text: &str,
        url: &str,
        run_date: &str,
        kinds: &str,
    ) -> Result<Vec<RawLlmItem>, LlmError> {
        if !self.config.enabled {
            return Err(LlmError::Disabled);
        }
        let prompt = EXTRACT_ITEMS_PROMPT
            .replace("{run_date}", run_date)
            .replace("{url}", url)
            .replace("{kinds}", kinds)
            .replace("{content}", self.truncate_content(page_text));

        let response = self.call_ollama(&prompt).await?;
        let items = parse_items_response(&response)?;
        debug!("LLM returned {} candidate items for {}", items.len(), url);
        Ok(items)
    }

    /// Truncate content to configured maximum (UTF-8 safe).
    fn truncate_content<'a>(&self, text: &'a str) -> &'a str {
        if text.len() <= self.config.max_content_chars {
            return text;
        }
        let mut end = self.config.max_content_chars;
        while end > 0 && !text.is_char_boundary(end) {
            end -= 1;
        }
        &text[..end]
    }

    async fn call_ollama(&self, prompt: &str) -> Result<String, LlmError> {
        let request = OllamaRequest {
            model: self.config.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
            format: "json",
            options: OllamaOptions {
                temperature: self.config.temperature,
                num_predict: self.config.max_tokens,
            },
        };

        let url = format!("{}/api/generate", self.config.base_url());
        let resp = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {}: {}", status, body)));
        }

        let ollama_resp: OllamaResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        Ok(ollama_resp.response)
    }
}

/// Parse the model's JSON answer, tolerating code fences and leading prose.
fn parse_items_response(response: &str) -> Result<Vec<RawLlmItem>, LlmError> {
    let trimmed = response.trim();
    let start = trimmed
        .find('{')
        .ok_or_else(|| LlmError::Parse("no JSON object in response".to_string()))?;
    let end = trimmed
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| LlmError::Parse("unterminated JSON object".to_string()))?;

    let envelope: ItemsEnvelope = serde_json::from_str(&trimmed[start..=end])
        .map_err(|e| LlmError::Parse(e.to_string()))?;
    Ok(envelope.items)
}
