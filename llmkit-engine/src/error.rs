//! Error types for the generation engine.

use std::collections::BTreeSet;

use llmkit_prompts::PromptError;
use thiserror::Error;

use crate::postprocess::PostprocessError;

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, GenerationError>;

/// Failures surfaced to the caller as errors.
///
/// A model call that fails is not one of them: it is reported as a
/// [`GenerationResult`](crate::GenerationResult) with `success == false`.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The template references names that were not supplied.
    #[error("missing data for placeholders: {names:?}")]
    MissingPlaceholder {
        /// Every referenced name without a value.
        names: BTreeSet<String>,
    },

    /// The template or a prompt unit could not be parsed or composed.
    #[error(transparent)]
    Prompt(PromptError),

    /// The model has no entry in one or both pricing maps.
    #[error("unsupported model name: {model}")]
    UnsupportedModel {
        /// The model identifier that could not be priced.
        model: String,
    },

    /// A usage-reporting model returned a response without token counts.
    #[error("model `{model}` returned a response without token usage metadata")]
    MalformedUsageMetadata {
        /// The model whose response was incomplete.
        model: String,
    },

    /// Post-processing the generated text failed.
    #[error("postprocessing failed: {source}")]
    Postprocess {
        /// Underlying post-processing failure.
        #[from]
        source: PostprocessError,
    },
}

impl From<PromptError> for GenerationError {
    fn from(err: PromptError) -> Self {
        match err {
            PromptError::MissingPlaceholder { names } => Self::MissingPlaceholder { names },
            other => Self::Prompt(other),
        }
    }
}

impl GenerationError {
    /// Convenience constructor for pricing lookups.
    #[must_use]
    pub fn unsupported_model(model: impl Into<String>) -> Self {
        Self::UnsupportedModel {
            model: model.into(),
        }
    }
}
