//! `OpenAI` chat-completions adapter.

use std::{env, fmt, time::Duration};

use async_trait::async_trait;
use hyper::Uri;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::http_client::{HyperClient, RetryPolicy, build_https_client, post_json, sanitize_base_url};
use crate::traits::{
    AdapterError, AdapterMetadata, AdapterResult, InvocationRequest, ModelAdapter, ModelResponse,
    TokenUsage,
};

/// Environment variable used when loading configuration automatically.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Configuration for the `OpenAI` adapter.
#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    api_key: Option<String>,
    model: String,
    base_url: String,
    timeout: Duration,
    default_temperature: Option<f32>,
    retry: RetryPolicy,
}

impl OpenAiConfig {
    /// Creates a configuration using the supplied default model identifier.
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            api_key: None,
            model: model.into(),
            base_url: "https://api.openai.com/".to_owned(),
            timeout: Duration::from_secs(60),
            default_temperature: None,
            retry: RetryPolicy::default(),
        }
    }

    /// Loads the API key from the `OPENAI_API_KEY` environment variable.
    #[must_use]
    pub fn from_env(model: impl Into<String>) -> Self {
        let mut cfg = Self::new(model);
        cfg.api_key = env::var(OPENAI_API_KEY_ENV).ok();
        cfg
    }

    /// Overrides the base URL used for API calls.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if the supplied URL is invalid.
    pub fn with_base_url(mut self, base_url: impl AsRef<str>) -> AdapterResult<Self> {
        self.base_url = sanitize_base_url("OpenAI", base_url.as_ref())?;
        Ok(self)
    }

    /// Sets the default sampling temperature used when requests omit it.
    #[must_use]
    pub fn with_default_temperature(mut self, temperature: f32) -> Self {
        self.default_temperature = Some(temperature);
        self
    }

    /// Sets the per-attempt HTTP timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the retry policy for transport failures and rate limiting.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Supplies an explicit API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

/// `OpenAI` adapter that calls the official API over HTTPS.
///
/// Every `OpenAI` chat model returns a `usage` block, so the adapter reports
/// usage for all model identifiers.
pub struct OpenAiAdapter {
    client: HyperClient,
    endpoint: Uri,
    metadata: AdapterMetadata,
    api_key: String,
    timeout: Duration,
    default_temperature: Option<f32>,
    retry: RetryPolicy,
}

impl fmt::Debug for OpenAiAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiAdapter")
            .field("model", &self.metadata.model())
            .field("endpoint", &self.endpoint)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl OpenAiAdapter {
    /// Constructs a new adapter with the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if the API key is missing or the
    /// endpoint is invalid.
    pub fn new(config: OpenAiConfig) -> AdapterResult<Self> {
        let api_key = config
            .api_key
            .ok_or_else(|| AdapterError::configuration("OpenAI adapter requires an API key"))?;

        let metadata = AdapterMetadata::new("openai", config.model.clone());
        let endpoint = format!("{}v1/chat/completions", config.base_url)
            .parse::<Uri>()
            .map_err(|err| {
                AdapterError::configuration(format!("invalid OpenAI endpoint: {err}"))
            })?;

        let client = build_https_client()?;

        Ok(Self {
            client,
            endpoint,
            metadata,
            api_key,
            timeout: config.timeout,
            default_temperature: config.default_temperature,
            retry: config.retry,
        })
    }

    fn build_request(&self, request: &InvocationRequest) -> ChatCompletionRequest {
        let messages = request
            .messages()
            .map(|(role, content)| OpenAiMessage {
                role: role.to_string(),
                content: content.to_owned(),
            })
            .collect();

        ChatCompletionRequest {
            model: request.model().to_owned(),
            messages,
            temperature: request.temperature().or(self.default_temperature),
            max_tokens: request.max_output_tokens(),
            stream: false,
        }
    }
}

#[async_trait]
impl ModelAdapter for OpenAiAdapter {
    fn metadata(&self) -> &AdapterMetadata {
        &self.metadata
    }

    fn reports_usage(&self, _model: &str) -> bool {
        true
    }

    async fn invoke(&self, request: InvocationRequest) -> AdapterResult<ModelResponse> {
        let payload = self.build_request(&request);
        let body = serde_json::to_vec(&payload).map_err(|err| {
            AdapterError::invalid_request(format!("failed to encode OpenAI request: {err}"))
        })?;

        let (bytes, attempts) = self
            .retry
            .run("openai", || {
                post_json(
                    &self.client,
                    "OpenAI",
                    &self.endpoint,
                    Some(self.api_key.as_str()),
                    body.clone(),
                    self.timeout,
                )
            })
            .await?;

        let mut response = decode_response(&bytes, request.model())?;
        response.attempts = attempts;
        debug!(model = %response.model, attempts, "OpenAI request completed");
        Ok(response)
    }
}

fn decode_response(bytes: &[u8], requested_model: &str) -> AdapterResult<ModelResponse> {
    let response: ChatCompletionResponse = serde_json::from_slice(bytes)
        .map_err(|err| AdapterError::response(format!("failed to decode OpenAI response: {err}")))?;

    let content = response
        .choices
        .into_iter()
        .find_map(|choice| choice.message.and_then(|message| message.content))
        .unwrap_or_default();

    let model = response
        .model
        .unwrap_or_else(|| requested_model.to_owned());

    let mut decoded = ModelResponse::new(model, content);
    match response.usage {
        Some(CompletionUsage {
            prompt_tokens: Some(input),
            completion_tokens: Some(output),
            total_tokens,
        }) => {
            let mut usage = TokenUsage::new(input, output);
            if let Some(total) = total_tokens {
                usage.total_tokens = total;
            }
            decoded = decoded.with_usage(usage);
        }
        Some(partial) => {
            warn!(usage = ?partial, "OpenAI usage block is incomplete");
        }
        None => {}
    }
    Ok(decoded)
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "max_tokens")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<CompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionUsage {
    #[serde(default)]
    prompt_tokens: Option<u64>,
    #[serde(default)]
    completion_tokens: Option<u64>,
    #[serde(default)]
    total_tokens: Option<u64>,
}
