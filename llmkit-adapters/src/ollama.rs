//! Adapter for a local Ollama daemon.

use std::{fmt, time::Duration};

use async_trait::async_trait;
use hyper::Uri;
use serde::{Deserialize, Serialize};

use crate::http_client::{HyperClient, RetryPolicy, build_https_client, post_json, sanitize_base_url};
use crate::traits::{
    AdapterError, AdapterMetadata, AdapterResult, InvocationRequest, ModelAdapter, ModelResponse,
    TokenUsage,
};

/// Settings for talking to a local Ollama daemon.
#[derive(Clone, Debug)]
pub struct OllamaConfig {
    base_url: String,
    model: String,
    timeout: Duration,
    keep_alive: Option<String>,
    context_window: Option<u32>,
}

impl OllamaConfig {
    /// Targets `model` on the daemon's default address.
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            base_url: "http://127.0.0.1:11434/".to_owned(),
            model: model.into(),
            timeout: Duration::from_secs(60),
            keep_alive: None,
            context_window: None,
        }
    }

    /// Points the adapter at another daemon.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if the URL has no scheme or does not parse.
    pub fn with_base_url(mut self, base_url: impl AsRef<str>) -> AdapterResult<Self> {
        self.base_url = sanitize_base_url("Ollama", base_url.as_ref())?;
        Ok(self)
    }

    /// Bounds each request, including model load time on a cold daemon.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// How long the daemon keeps the model loaded after a call, e.g. `"10m"`.
    #[must_use]
    pub fn with_keep_alive(mut self, keep_alive: impl Into<String>) -> Self {
        self.keep_alive = Some(keep_alive.into());
        self
    }

    /// Overrides the model's context window (`num_ctx`).
    #[must_use]
    pub fn with_context_window(mut self, tokens: u32) -> Self {
        self.context_window = Some(tokens);
        self
    }
}

/// Adapter for `POST /api/chat` on an Ollama daemon.
///
/// Local models cost nothing per token, so the adapter stays out of cost
/// accounting even though the daemon reports evaluation counts.
pub struct OllamaAdapter {
    client: HyperClient,
    endpoint: Uri,
    metadata: AdapterMetadata,
    timeout: Duration,
    keep_alive: Option<String>,
    context_window: Option<u32>,
}

impl fmt::Debug for OllamaAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OllamaAdapter")
            .field("model", &self.metadata.model())
            .field("endpoint", &self.endpoint)
            .field("keep_alive", &self.keep_alive)
            .finish_non_exhaustive()
    }
}

impl OllamaAdapter {
    /// Creates the adapter.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if the chat endpoint cannot be
    /// derived from the base URL.
    pub fn new(config: OllamaConfig) -> AdapterResult<Self> {
        let endpoint = format!("{}api/chat", config.base_url)
            .parse::<Uri>()
            .map_err(|err| AdapterError::configuration(format!("invalid Ollama endpoint: {err}")))?;

        Ok(Self {
            client: build_https_client()?,
            endpoint,
            metadata: AdapterMetadata::new("ollama", config.model),
            timeout: config.timeout,
            keep_alive: config.keep_alive,
            context_window: config.context_window,
        })
    }

    fn chat_request(&self, request: &InvocationRequest) -> ChatRequest {
        let options = ChatOptions {
            temperature: request.temperature(),
            num_predict: request.max_output_tokens(),
            num_ctx: self.context_window,
        };

        ChatRequest {
            model: request.model().to_owned(),
            stream: false,
            messages: request
                .messages()
                .map(|(role, content)| ChatMessage {
                    role: role.to_string(),
                    content: content.to_owned(),
                })
                .collect(),
            options: (!options.is_empty()).then_some(options),
            keep_alive: self.keep_alive.clone(),
        }
    }
}

#[async_trait]
impl ModelAdapter for OllamaAdapter {
    fn metadata(&self) -> &AdapterMetadata {
        &self.metadata
    }

    fn reports_usage(&self, _model: &str) -> bool {
        false
    }

    async fn invoke(&self, request: InvocationRequest) -> AdapterResult<ModelResponse> {
        let payload = self.chat_request(&request);
        let body = serde_json::to_vec(&payload).map_err(|err| {
            AdapterError::invalid_request(format!("failed to encode Ollama request: {err}"))
        })?;

        // Single attempt against the local daemon.
        let (bytes, attempts) = RetryPolicy::none()
            .run("ollama", || {
                post_json(
                    &self.client,
                    "Ollama",
                    &self.endpoint,
                    None,
                    body.clone(),
                    self.timeout,
                )
            })
            .await?;

        let mut response = decode_response(&bytes, request.model())?;
        response.attempts = attempts;
        Ok(response)
    }
}

fn decode_response(bytes: &[u8], requested_model: &str) -> AdapterResult<ModelResponse> {
    let response: ChatResponse = serde_json::from_slice(bytes)
        .map_err(|err| AdapterError::response(format!("failed to decode Ollama response: {err}")))?;

    if let Some(error) = response.error {
        return Err(AdapterError::response(error));
    }

    let content = response
        .message
        .map(|message| message.content)
        .or(response.response)
        .unwrap_or_default();

    let mut decoded = ModelResponse::new(requested_model, content);
    if let (Some(input), Some(output)) = (response.prompt_eval_count, response.eval_count) {
        decoded = decoded.with_usage(TokenUsage::new(input, output));
    }
    Ok(decoded)
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    stream: bool,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ChatOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    keep_alive: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_ctx: Option<u32>,
}

impl ChatOptions {
    fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.num_predict.is_none() && self.num_ctx.is_none()
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ChatMessage>,
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
    #[serde(default)]
    error: Option<String>,
}
