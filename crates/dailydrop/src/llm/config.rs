//! LLM client configuration.
//!
//! Read from the `[llm]` config section, then overridden by the environment:
//! LLM_ENABLED, LLM_ENDPOINT (or OLLAMA_HOST), LLM_MODEL.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Whether the AI extractor may call the backend at all.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Maximum tokens in response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Maximum characters of page text sent to the model
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,
    /// Request timeout in seconds; local models can be slow.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_temperature() -> f32 {
    0.1
}

fn default_max_content_chars() -> usize {
    16000
}

fn default_timeout_secs() -> u64 {
    180
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_endpoint(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            max_content_chars: default_max_content_chars(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl LlmConfig {
    /// Default config with environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply LLM_* environment variables on top of file settings.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("LLM_ENABLED") {
            if let Some(enabled) = parse_bool(&val) {
                self.enabled = enabled;
            }
        }

        // Explicit endpoint wins over OLLAMA_HOST
        if let Ok(endpoint) = std::env::var("LLM_ENDPOINT") {
            self.endpoint = endpoint;
        } else if let Ok(host) = std::env::var("OLLAMA_HOST") {
            self.endpoint = host;
        }

        if let Ok(model) = std::env::var("LLM_MODEL") {
            self.model = model;
        }

        self
    }

    /// Endpoint without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.endpoint.trim_end_matches('/')
    }

    pub fn availability_hint(&self) -> String {
        format!(
            "Ollama not available at {}. Set LLM_ENABLED=true and make sure Ollama is running: ollama serve",
            self.endpoint
        )
    }
}

fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_disabled() {
        let config = LlmConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.base_url(), "http://localhost:11434");
    }

    #[test]
    fn test_section_deserializes_with_defaults() {
        let config: LlmConfig = toml::from_str("enabled = true\nmodel = \"qwen2.5\"").unwrap();
        assert!(config.enabled);
        assert_eq!(config.model, "qwen2.5");
        assert_eq!(config.max_content_chars, 16000);
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("Yes"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
