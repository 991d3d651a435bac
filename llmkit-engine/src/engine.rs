//! Generation pipeline: template to formatted prompt to priced result.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use llmkit_adapters::traits::{InvocationRequest, ModelAdapter, ModelResponse};
use llmkit_prompts::units::{ANSWER_REFINER, ANSWER_TO_BE_REFINED, SEMANTIC_ELEMENT_FOR_EXTRACTION};
use llmkit_prompts::{PlaceholderValues, PromptTemplate, UnitRegistry};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::cost::CostTable;
use crate::dict_parser::DictParser;
use crate::error::{EngineResult, GenerationError};
use crate::postprocess::{OutputTransform, PostprocessConfig, RefinementConfig};
use crate::request::GenerationRequest;
use crate::result::{GenerationMeta, GenerationResult, ResponseType};

/// Error message carried by results whose model call failed.
pub const INVOCATION_FAILED: &str = "LLM invocation failed";

/// Raw outcome of one model call, without any accounting.
#[derive(Clone, Debug, PartialEq)]
pub struct InvocationOutcome {
    /// The response, or `None` when the call failed.
    pub response: Option<ModelResponse>,
    /// Wall-clock time spent in the call.
    pub elapsed: Duration,
    /// Attempts made by the adapter, whether or not the call succeeded.
    pub attempts: u32,
}

impl InvocationOutcome {
    /// Returns `true` when the call produced a response.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.response.is_some()
    }
}

/// Coordinates prompt formatting, model invocation, and cost accounting.
///
/// The selected model is changed through `&mut self`, so an engine shared
/// between tasks cannot have its model switched underneath a running call.
/// Use [`GenerationRequest::with_model`] for per-call overrides instead.
#[derive(Clone)]
pub struct GenerationEngine {
    adapter: Arc<dyn ModelAdapter>,
    units: UnitRegistry,
    costs: CostTable,
    parser: DictParser,
    model: String,
}

impl fmt::Debug for GenerationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationEngine")
            .field("provider", &self.adapter.metadata().provider())
            .field("model", &self.model)
            .field("units", &self.units.len())
            .finish_non_exhaustive()
    }
}

impl GenerationEngine {
    /// Creates an engine using the adapter's default model, the built-in
    /// refinement units, and the `OpenAI` price list.
    #[must_use]
    pub fn new(adapter: Arc<dyn ModelAdapter>) -> Self {
        let model = adapter.metadata().model().to_owned();
        Self {
            adapter,
            units: UnitRegistry::with_builtin_units(),
            costs: CostTable::openai_defaults(),
            parser: DictParser::new(),
            model,
        }
    }

    /// Selects the model, returning the updated engine for chaining.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.pick_model(model);
        self
    }

    /// Replaces the pricing table.
    #[must_use]
    pub fn with_cost_table(mut self, costs: CostTable) -> Self {
        self.costs = costs;
        self
    }

    /// Replaces the unit registry.
    ///
    /// Refinement needs the units provided by
    /// [`UnitRegistry::with_builtin_units`].
    #[must_use]
    pub fn with_units(mut self, units: UnitRegistry) -> Self {
        self.units = units;
        self
    }

    /// Returns the selected model.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns the pricing table.
    #[must_use]
    pub const fn cost_table(&self) -> &CostTable {
        &self.costs
    }

    /// Returns the unit registry.
    #[must_use]
    pub const fn units(&self) -> &UnitRegistry {
        &self.units
    }

    /// Loads prompt units from a YAML file into the registry.
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError::Prompt`] if the file cannot be read or parsed.
    pub fn load_prompts(&mut self, path: impl AsRef<Path>) -> EngineResult<usize> {
        Ok(self.units.load_unit_skeletons_from_yaml(path)?)
    }

    /// Selects the model used by subsequent calls.
    pub fn pick_model(&mut self, model: impl Into<String>) {
        let model = model.into();
        info!(from = %self.model, to = %model, "model selected");
        self.model = model;
    }

    /// Composes registered units, in order, into an unformatted template.
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError::Prompt`] for unknown units or malformed unit content.
    pub fn craft_prompt<S: AsRef<str>>(
        &self,
        placeholder_values: &PlaceholderValues,
        unit_order: &[S],
    ) -> EngineResult<String> {
        Ok(self.units.craft(unit_order, placeholder_values)?)
    }

    /// Formats `template` with `values` and sends it to the selected model.
    ///
    /// Extra keys in `values` are ignored. A failed model call is reported as a
    /// result with `success == false`.
    ///
    /// # Errors
    ///
    /// - [`GenerationError::MissingPlaceholder`] before any call is made.
    /// - [`GenerationError::UnsupportedModel`] before any call is made, when the
    ///   model reports usage but has no price.
    /// - [`GenerationError::MalformedUsageMetadata`] when usage is missing from
    ///   a successful response.
    pub async fn generate(
        &self,
        template: &str,
        values: &PlaceholderValues,
    ) -> EngineResult<GenerationResult> {
        self.generate_with(&self.model, template, values).await
    }

    /// Runs [`generate`](Self::generate), then the optional transform, and
    /// labels the result with `operation_name`.
    ///
    /// # Errors
    ///
    /// Errors of [`generate`](Self::generate), plus
    /// [`GenerationError::Postprocess`].
    pub async fn generate_output(
        &self,
        template: &str,
        values: &PlaceholderValues,
        transform: Option<OutputTransform>,
        operation_name: Option<&str>,
    ) -> EngineResult<GenerationResult> {
        let mut request = GenerationRequest::new(template, values.clone());
        request.transform = transform;
        request.operation_name = operation_name.map(str::to_owned);
        self.execute(request).await
    }

    /// Runs a fully parameterised request.
    ///
    /// When post-processing produces a value it replaces `content`, and the
    /// generated text moves to `raw_content`. A successful refinement does the
    /// same with the refined answer, and its tokens and costs are added to
    /// `meta`.
    ///
    /// # Errors
    ///
    /// See [`generate_output`](Self::generate_output).
    pub async fn execute(&self, request: GenerationRequest) -> EngineResult<GenerationResult> {
        let GenerationRequest {
            template,
            values,
            model,
            transform,
            operation_name,
            request_id,
        } = request;
        let model = model.as_deref().unwrap_or(&self.model);

        let mut result = self.generate_with(model, &template, &values).await?;
        result.request_id = Some(request_id);
        result.operation_name = operation_name;

        if result.success {
            match &transform {
                Some(OutputTransform::Postprocess(config)) => {
                    self.apply_postprocess(&mut result, config)?;
                }
                Some(OutputTransform::Refine(config)) => {
                    self.apply_refinement(model, &mut result, config).await?;
                }
                None => {}
            }
        }

        info!(
            request_id = %request_id.short(),
            operation = result.operation_name.as_deref().unwrap_or_default(),
            model,
            success = result.success,
            total_tokens = result.meta.total_tokens,
            total_cost = result.meta.total_cost,
            "generation finished"
        );
        Ok(result)
    }

    /// Applies post-processing options to `text`.
    ///
    /// Returns `None` when no option is enabled.
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError::Postprocess`] for parse, lookup, or validation failures.
    pub fn postprocessor(&self, text: &str, config: &PostprocessConfig) -> EngineResult<Option<Value>> {
        Ok(config.apply(&self.parser, text)?)
    }

    /// Asks the selected model to isolate an element of a prior answer.
    ///
    /// The prompt is crafted from the `answer_to_be_refined`,
    /// `semantic_element_for_extraction`, and `answer_refiner` units.
    ///
    /// # Errors
    ///
    /// Errors of [`craft_prompt`](Self::craft_prompt) and
    /// [`generate`](Self::generate).
    pub async fn answer_isolater_refiner(
        &self,
        text: &str,
        config: &RefinementConfig,
    ) -> EngineResult<GenerationResult> {
        self.refine_with(&self.model, text, config).await
    }

    /// Prices a call with the engine's table.
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError::UnsupportedModel`] for unpriced models.
    pub fn cost_calculator(
        &self,
        input_tokens: u64,
        output_tokens: u64,
        model: &str,
    ) -> EngineResult<(f64, f64)> {
        self.costs.cost_calculator(input_tokens, output_tokens, model)
    }

    /// Sends an already formatted prompt to the selected model.
    ///
    /// No accounting is done; failures are logged and reported as an outcome
    /// without a response.
    pub async fn invoke_llm_async(&self, formatted_prompt: &str) -> InvocationOutcome {
        self.invoke(&self.model, formatted_prompt).await
    }

    async fn generate_with(
        &self,
        model: &str,
        template: &str,
        values: &PlaceholderValues,
    ) -> EngineResult<GenerationResult> {
        let parsed = PromptTemplate::new(template);
        let referenced = parsed.placeholders()?;

        let missing: BTreeSet<String> = referenced
            .iter()
            .filter(|name| !values.contains_key(name.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            warn!(model, missing = ?missing, "template references placeholders without values");
            return Err(GenerationError::MissingPlaceholder { names: missing });
        }

        let filtered: PlaceholderValues = values
            .iter()
            .filter(|(name, _)| referenced.contains(name.as_str()))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        let formatted = parsed.format(&filtered)?;

        let reports_usage = self.adapter.reports_usage(model);
        if reports_usage && !self.costs.supports(model) {
            warn!(model, "refusing to call a model without pricing");
            return Err(GenerationError::unsupported_model(model));
        }

        let outcome = self.invoke(model, &formatted).await;
        let Some(response) = outcome.response else {
            let mut failed =
                GenerationResult::failure(INVOCATION_FAILED, model).with_prompts(template, formatted);
            failed.number_of_retries = outcome.attempts.saturating_sub(1);
            return Ok(failed);
        };

        let meta = if reports_usage {
            let usage = response
                .usage
                .ok_or_else(|| GenerationError::MalformedUsageMetadata {
                    model: model.to_owned(),
                })?;
            if usage.total_tokens != usage.input_tokens + usage.output_tokens {
                debug!(
                    model,
                    reported = usage.total_tokens,
                    "provider total differs from input plus output"
                );
            }
            let costs = self
                .costs
                .cost_calculator(usage.input_tokens, usage.output_tokens, model)?;
            GenerationMeta::priced(usage, costs, outcome.elapsed)
        } else {
            GenerationMeta::timed(outcome.elapsed)
        };

        let retries = response.retries();
        let mut result =
            GenerationResult::success(response.content, model, meta).with_prompts(template, formatted);
        result.number_of_retries = retries;

        info!(
            model,
            input_tokens = meta.input_tokens,
            output_tokens = meta.output_tokens,
            total_cost = meta.total_cost,
            elapsed = ?meta.elapsed_time_for_invoke,
            retries,
            "generation completed"
        );
        Ok(result)
    }

    async fn invoke(&self, model: &str, prompt: &str) -> InvocationOutcome {
        let started = Instant::now();
        let response = match InvocationRequest::new(model, prompt) {
            Ok(request) => self.adapter.invoke(request).await,
            Err(err) => Err(err),
        };
        let elapsed = started.elapsed();

        match response {
            Ok(response) => {
                debug!(model, elapsed = ?elapsed, response = %response.content, "model responded");
                InvocationOutcome {
                    attempts: response.attempts,
                    response: Some(response),
                    elapsed,
                }
            }
            Err(err) => {
                let attempts = err.attempts();
                error!(model, elapsed = ?elapsed, attempts, error = %err, "model invocation failed");
                InvocationOutcome {
                    response: None,
                    elapsed,
                    attempts,
                }
            }
        }
    }

    async fn refine_with(
        &self,
        model: &str,
        answer: &str,
        config: &RefinementConfig,
    ) -> EngineResult<GenerationResult> {
        let mut values = PlaceholderValues::new();
        values.insert(ANSWER_TO_BE_REFINED.to_owned(), answer.to_owned());
        values.insert(
            SEMANTIC_ELEMENT_FOR_EXTRACTION.to_owned(),
            config.semantic_element_for_extraction.clone(),
        );

        let template = self.craft_prompt(
            &values,
            &[ANSWER_TO_BE_REFINED, SEMANTIC_ELEMENT_FOR_EXTRACTION, ANSWER_REFINER],
        )?;
        let refined = self.generate_with(model, &template, &values).await?;
        debug!(
            model,
            success = refined.success,
            refined = refined.content().unwrap_or_default(),
            "refinement completed"
        );
        Ok(refined)
    }

    fn apply_postprocess(
        &self,
        result: &mut GenerationResult,
        config: &PostprocessConfig,
    ) -> EngineResult<()> {
        let Some(raw) = result.content.take() else {
            return Ok(());
        };

        match config.apply(&self.parser, &raw) {
            Ok(Some(value)) => {
                let (content, response_type) = match value {
                    Value::String(text) => (text, ResponseType::Text),
                    other => (other.to_string(), ResponseType::Json),
                };
                result.content = Some(content);
                result.response_type = response_type;
                result.raw_content = Some(raw);
                Ok(())
            }
            Ok(None) => {
                result.content = Some(raw);
                Ok(())
            }
            Err(err) => {
                warn!(model = %result.model, error = %err, "postprocessing failed");
                Err(err.into())
            }
        }
    }

    async fn apply_refinement(
        &self,
        model: &str,
        result: &mut GenerationResult,
        config: &RefinementConfig,
    ) -> EngineResult<()> {
        let Some(answer) = result.content.as_deref() else {
            return Ok(());
        };
        let refined = match self.refine_with(model, answer, config).await {
            Ok(refined) => refined,
            Err(err) => {
                warn!(model, error = %err, "refinement could not run, keeping the original answer");
                return Ok(());
            }
        };

        result.meta.absorb(&refined.meta);
        result.number_of_retries = result
            .number_of_retries
            .saturating_add(refined.number_of_retries);
        if refined.success {
            result.raw_content = result.content.take();
            result.content = refined.content;
        } else {
            warn!(model, "refinement failed, keeping the original answer");
        }
        Ok(())
    }
}
