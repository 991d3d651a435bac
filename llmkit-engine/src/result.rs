//! The structured outcome of one generation.

use std::time::Duration;

use llmkit_adapters::traits::TokenUsage;
use llmkit_primitives::RequestId;
use serde::{Deserialize, Serialize};

/// Token counts, invocation latency, and costs for one generation.
///
/// Every field is zero unless the model reported usage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationMeta {
    /// Prompt tokens.
    pub input_tokens: u64,
    /// Generated tokens.
    pub output_tokens: u64,
    /// `input_tokens + output_tokens`.
    pub total_tokens: u64,
    /// Wall-clock time spent in the model call only.
    pub elapsed_time_for_invoke: Duration,
    /// USD spent on prompt tokens.
    pub input_cost: f64,
    /// USD spent on generated tokens.
    pub output_cost: f64,
    /// `input_cost + output_cost`.
    pub total_cost: f64,
}

impl GenerationMeta {
    /// Builds accounting data from reported usage and the matching costs.
    #[must_use]
    pub fn priced(usage: TokenUsage, (input_cost, output_cost): (f64, f64), elapsed: Duration) -> Self {
        Self {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            total_tokens: usage.input_tokens.saturating_add(usage.output_tokens),
            elapsed_time_for_invoke: elapsed,
            input_cost,
            output_cost,
            total_cost: input_cost + output_cost,
        }
    }

    /// Meta for a model that does not report usage: only the latency is known.
    #[must_use]
    pub fn timed(elapsed: Duration) -> Self {
        Self {
            elapsed_time_for_invoke: elapsed,
            ..Self::default()
        }
    }

    /// Adds the counts, costs, and latency of a follow-up call.
    pub fn absorb(&mut self, other: &Self) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
        self.total_tokens = self.total_tokens.saturating_add(other.total_tokens);
        self.elapsed_time_for_invoke += other.elapsed_time_for_invoke;
        self.input_cost += other.input_cost;
        self.output_cost += other.output_cost;
        self.total_cost += other.total_cost;
    }
}

/// Shape of [`GenerationResult::content`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// Content is serialized JSON produced by post-processing.
    Json,
    /// Plain generated text.
    #[default]
    #[serde(rename = "str")]
    Text,
}

/// Outcome of a generation, owned by the caller.
///
/// `content` is present exactly when `success` is `true`, and
/// `error_message` exactly when it is `false`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    /// Whether the model call succeeded.
    pub success: bool,
    /// Token and cost accounting.
    pub meta: GenerationMeta,
    /// Generated (and possibly post-processed) text.
    pub content: Option<String>,
    /// Text as generated, kept when post-processing replaced `content`.
    pub raw_content: Option<String>,
    /// Time for the outer call. Left at zero; see
    /// [`GenerationMeta::elapsed_time_for_invoke`].
    pub elapsed_time: Duration,
    /// Failure description.
    pub error_message: Option<String>,
    /// Model the prompt was sent to.
    pub model: String,
    /// Prompt after placeholder substitution.
    pub formatted_prompt: Option<String>,
    /// Template before substitution.
    pub unformatted_prompt: Option<String>,
    /// Caller-supplied label.
    pub operation_name: Option<String>,
    /// Correlation id.
    pub request_id: Option<RequestId>,
    /// Shape of `content`.
    pub response_type: ResponseType,
    /// Attempts beyond the first made by the adapter.
    pub number_of_retries: u32,
}

impl GenerationResult {
    /// Creates a successful result carrying `content`.
    #[must_use]
    pub fn success(content: impl Into<String>, model: impl Into<String>, meta: GenerationMeta) -> Self {
        Self {
            success: true,
            meta,
            content: Some(content.into()),
            raw_content: None,
            elapsed_time: Duration::ZERO,
            error_message: None,
            model: model.into(),
            formatted_prompt: None,
            unformatted_prompt: None,
            operation_name: None,
            request_id: None,
            response_type: ResponseType::Text,
            number_of_retries: 0,
        }
    }

    /// Creates a failed result with zeroed meta and no content.
    #[must_use]
    pub fn failure(error_message: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            success: false,
            content: None,
            error_message: Some(error_message.into()),
            ..Self::success(String::new(), model, GenerationMeta::default())
        }
    }

    /// Records the prompt in both forms.
    #[must_use]
    pub fn with_prompts(mut self, unformatted: impl Into<String>, formatted: impl Into<String>) -> Self {
        self.unformatted_prompt = Some(unformatted.into());
        self.formatted_prompt = Some(formatted.into());
        self
    }

    /// Returns the content, if the generation succeeded.
    #[must_use]
    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }
}
