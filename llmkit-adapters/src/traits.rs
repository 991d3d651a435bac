//! Shared model adapter traits and data structures.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias used by model adapters.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Error type shared by adapter implementations.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Adapter is misconfigured or missing credentials.
    #[error("adapter not configured: {reason}")]
    Configuration {
        /// Additional context for the failure.
        reason: String,
    },

    /// The supplied request was invalid for the target model.
    #[error("invalid invocation request: {reason}")]
    InvalidRequest {
        /// Reason describing why the request could not be processed.
        reason: String,
    },

    /// Transport-level failures (network, protocol, timeouts).
    #[error("adapter transport error: {reason}")]
    Transport {
        /// Additional context about the error.
        reason: String,
    },

    /// The provider rejected the request due to rate limiting.
    #[error("adapter rate limited (retry after {retry_after:?})")]
    RateLimited {
        /// Suggested delay before retrying.
        retry_after: Option<Duration>,
    },

    /// The provider returned an error status or a malformed response.
    #[error("adapter response error: {reason}")]
    Response {
        /// Additional context about the response failure.
        reason: String,
    },

    /// Retryable failures continued until the retry budget ran out.
    #[error("adapter gave up after {attempts} attempts: {last}")]
    Exhausted {
        /// Attempts made, including the first.
        attempts: u32,
        /// Error returned by the final attempt.
        #[source]
        last: Box<AdapterError>,
    },
}

impl AdapterError {
    /// Convenience constructor for invalid requests.
    #[must_use]
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for configuration issues.
    #[must_use]
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for transport failures.
    #[must_use]
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for response failures.
    #[must_use]
    pub fn response(reason: impl Into<String>) -> Self {
        Self::Response {
            reason: reason.into(),
        }
    }

    /// Wraps the last error of a retry loop that ran out of attempts.
    #[must_use]
    pub fn exhausted(attempts: u32, last: Self) -> Self {
        Self::Exhausted {
            attempts,
            last: Box::new(last),
        }
    }

    /// Returns `true` for failures that may succeed when the request is repeated.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::RateLimited { .. })
    }

    /// Returns how many attempts were made before this error was returned.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } => *attempts,
            _ => 1,
        }
    }
}

/// Minimal metadata describing a model adapter instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdapterMetadata {
    provider: &'static str,
    model: String,
}

impl AdapterMetadata {
    /// Creates metadata for the supplied provider and default model identifier.
    #[must_use]
    pub fn new(provider: &'static str, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    /// Returns the provider identifier (e.g., "openai").
    #[must_use]
    pub const fn provider(&self) -> &'static str {
        self.provider
    }

    /// Returns the model used when a request does not name one.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

/// Roles supported in chat-style prompts.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System messages steer the assistant behaviour.
    System,
    /// User-authored content.
    User,
    /// Assistant (model) responses.
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        })
    }
}

/// Request submitted to a model adapter: one fully formatted prompt.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct InvocationRequest {
    model: String,
    prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

impl InvocationRequest {
    /// Creates a request sending `prompt` to `model`.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::InvalidRequest`] if the model name or prompt is empty.
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> AdapterResult<Self> {
        let model = model.into();
        let prompt = prompt.into();
        if model.trim().is_empty() {
            return Err(AdapterError::invalid_request(
                "invocation request requires a model identifier",
            ));
        }
        if prompt.is_empty() {
            return Err(AdapterError::invalid_request(
                "invocation request requires a non-empty prompt",
            ));
        }

        Ok(Self {
            model,
            prompt,
            system_prompt: None,
            max_output_tokens: None,
            temperature: None,
        })
    }

    /// Sets the system prompt that guides model behavior.
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Sets the maximum output token budget.
    #[must_use]
    pub fn with_max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = Some(tokens);
        self
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Returns the target model identifier.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns the formatted prompt.
    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Returns the system prompt if configured.
    #[must_use]
    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    /// Returns the configured maximum output tokens.
    #[must_use]
    pub const fn max_output_tokens(&self) -> Option<u32> {
        self.max_output_tokens
    }

    /// Returns the configured sampling temperature.
    #[must_use]
    pub const fn temperature(&self) -> Option<f32> {
        self.temperature
    }

    /// Expands the request into chat messages: optional system message, then the prompt.
    pub(crate) fn messages(&self) -> impl Iterator<Item = (MessageRole, &str)> {
        self.system_prompt
            .as_deref()
            .map(|system| (MessageRole::System, system))
            .into_iter()
            .chain(std::iter::once((MessageRole::User, self.prompt.as_str())))
    }
}

/// Token counts reported by providers that expose usage metadata.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct TokenUsage {
    /// Tokens consumed by the prompt.
    pub input_tokens: u64,
    /// Tokens generated by the model.
    pub output_tokens: u64,
    /// Total as reported by the provider.
    pub total_tokens: u64,
}

impl TokenUsage {
    /// Creates a usage record, deriving the total from its parts.
    #[must_use]
    pub const fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens.saturating_add(output_tokens),
        }
    }
}

/// Completed model response.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ModelResponse {
    /// Generated text.
    pub content: String,
    /// Usage metadata, when the provider returned it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    /// Model that served the request.
    pub model: String,
    /// Number of HTTP attempts made, including the successful one.
    pub attempts: u32,
}

impl ModelResponse {
    /// Creates a response from a single attempt without usage metadata.
    #[must_use]
    pub fn new(model: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            usage: None,
            model: model.into(),
            attempts: 1,
        }
    }

    /// Attaches usage metadata.
    #[must_use]
    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Returns how many attempts beyond the first were needed.
    #[must_use]
    pub const fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// Trait implemented by all model adapters.
#[async_trait]
pub trait ModelAdapter: Send + Sync {
    /// Returns basic metadata describing the adapter instance.
    fn metadata(&self) -> &AdapterMetadata;

    /// Returns `true` when responses for `model` carry token usage that can be
    /// priced.
    fn reports_usage(&self, model: &str) -> bool;

    /// Sends one formatted prompt to the model.
    async fn invoke(&self, request: InvocationRequest) -> AdapterResult<ModelResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_total_saturates() {
        let usage = TokenUsage::new(u64::MAX, 5);
        assert_eq!(usage.total_tokens, u64::MAX);
    }

    #[test]
    fn exhausted_error_reports_attempts() {
        let err = AdapterError::exhausted(3, AdapterError::transport("reset"));
        assert_eq!(err.attempts(), 3);
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("3 attempts"));
        assert_eq!(AdapterError::transport("reset").attempts(), 1);
    }

    #[test]
    fn validates_request_fields() {
        let err = InvocationRequest::new("", "ping").expect_err("model required");
        assert!(matches!(err, AdapterError::InvalidRequest { .. }));

        let err = InvocationRequest::new("gpt-4o", "").expect_err("prompt required");
        assert!(matches!(err, AdapterError::InvalidRequest { .. }));
    }

    #[test]
    fn builds_request() {
        let request = InvocationRequest::new("gpt-4o-mini", "ping")
            .unwrap()
            .with_system_prompt("be brief")
            .with_max_output_tokens(256)
            .with_temperature(0.7);

        assert_eq!(request.model(), "gpt-4o-mini");
        assert_eq!(request.max_output_tokens(), Some(256));
        assert_eq!(request.temperature(), Some(0.7));

        let messages: Vec<_> = request.messages().collect();
        assert_eq!(
            messages,
            vec![(MessageRole::System, "be brief"), (MessageRole::User, "ping")]
        );
    }

    #[test]
    fn usage_total_is_sum() {
        let usage = TokenUsage::new(10, 5);
        assert_eq!(usage.total_tokens, 15);
    }

    #[test]
    fn retry_classification() {
        assert!(AdapterError::transport("reset").is_retryable());
        assert!(AdapterError::RateLimited { retry_after: None }.is_retryable());
        assert!(!AdapterError::response("500").is_retryable());
        assert!(!AdapterError::configuration("key").is_retryable());
    }

    #[test]
    fn retries_exclude_first_attempt() {
        let mut response = ModelResponse::new("m", "hi");
        assert_eq!(response.retries(), 0);
        response.attempts = 3;
        assert_eq!(response.retries(), 2);
    }
}
