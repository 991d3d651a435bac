//! Fully parameterised generation requests.

use llmkit_primitives::RequestId;
use llmkit_prompts::PlaceholderValues;

use crate::postprocess::OutputTransform;

/// One generation: a template, its values, and per-call options.
///
/// Options left unset fall back to the engine's configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationRequest {
    /// Unformatted template.
    pub template: String,
    /// Values for the template's placeholders. Extra keys are ignored.
    pub values: PlaceholderValues,
    /// Model to use instead of the engine's selected model.
    pub model: Option<String>,
    /// Post-processing or refinement applied on success.
    pub transform: Option<OutputTransform>,
    /// Label attached to the result.
    pub operation_name: Option<String>,
    /// Correlation id attached to the result.
    pub request_id: RequestId,
}

impl GenerationRequest {
    /// Creates a request with a fresh id and no options.
    #[must_use]
    pub fn new(template: impl Into<String>, values: PlaceholderValues) -> Self {
        Self {
            template: template.into(),
            values,
            model: None,
            transform: None,
            operation_name: None,
            request_id: RequestId::random(),
        }
    }

    /// Overrides the model for this request only.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the post-processing or refinement step.
    #[must_use]
    pub fn with_transform(mut self, transform: impl Into<OutputTransform>) -> Self {
        self.transform = Some(transform.into());
        self
    }

    /// Labels the request.
    #[must_use]
    pub fn with_operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    /// Uses a caller-supplied correlation id.
    #[must_use]
    pub fn with_request_id(mut self, id: RequestId) -> Self {
        self.request_id = id;
        self
    }
}
