//! Strongly typed configuration schema.

use std::path::PathBuf;

use llmkit_telemetry::LoggingConfig;
use serde::{Deserialize, Serialize};

/// Which model provider the engine talks to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Hosted `OpenAI` chat completions.
    #[default]
    OpenAi,
    /// A local Ollama daemon.
    Ollama,
}

/// `OpenAI` connection settings. The API key comes from `OPENAI_API_KEY`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiSettings {
    /// API base URL.
    pub base_url: String,
    /// Per-attempt timeout in seconds.
    pub timeout_secs: u64,
    /// Retries after the first attempt for transport errors and rate limits.
    pub max_retries: u32,
    /// Delay between retries in milliseconds.
    pub retry_delay_ms: u64,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/".to_owned(),
            timeout_secs: 60,
            max_retries: 2,
            retry_delay_ms: 500,
        }
    }
}

/// Ollama connection settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaSettings {
    /// Daemon base URL.
    pub base_url: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// How long the daemon keeps the model loaded, e.g. `"10m"`.
    pub keep_alive: Option<String>,
}

impl Default for OllamaSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:11434/".to_owned(),
            timeout_secs: 60,
            keep_alive: None,
        }
    }
}

/// Price of one model, in USD per million tokens.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PricingEntry {
    /// Model identifier.
    pub model: String,
    /// Prompt token price.
    pub input_per_million: f64,
    /// Generated token price.
    pub output_per_million: f64,
}

/// Top-level configuration. Every section is optional.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Model selected at start-up.
    pub model: String,
    /// YAML file of prompt units to load.
    pub prompts_path: Option<PathBuf>,
    /// Provider to connect to.
    pub provider: Provider,
    /// `OpenAI` settings.
    pub openai: OpenAiSettings,
    /// Ollama settings.
    pub ollama: OllamaSettings,
    /// Prices added to, or overriding, the built-in table.
    pub pricing: Vec<PricingEntry>,
    /// Log output settings.
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_owned(),
            prompts_path: None,
            provider: Provider::default(),
            openai: OpenAiSettings::default(),
            ollama: OllamaSettings::default(),
            pricing: Vec::new(),
            logging: LoggingConfig::default(),
        }
    }
}
