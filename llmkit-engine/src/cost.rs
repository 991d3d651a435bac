//! Per-token pricing used for cost accounting.

use std::collections::HashMap;

use crate::error::{EngineResult, GenerationError};

const PER_MILLION: f64 = 1_000_000.0;

/// Immutable model pricing, in USD per token.
///
/// Input and output prices live in separate maps. A model missing from
/// either map cannot be priced.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CostTable {
    input: HashMap<String, f64>,
    output: HashMap<String, f64>,
}

impl CostTable {
    /// Creates a table without any prices.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns the built-in `OpenAI` price list.
    #[must_use]
    pub fn openai_defaults() -> Self {
        Self::builder()
            .model("gpt-4o", 5.0, 15.0)
            .model("gpt-4o-2024-08-06", 2.5, 10.0)
            .model("gpt-4o-mini", 0.15, 0.6)
            .model("o1-preview", 15.0, 60.0)
            .model("o1-mini", 3.0, 12.0)
            .build()
    }

    /// Starts an empty builder.
    #[must_use]
    pub fn builder() -> CostTableBuilder {
        CostTableBuilder::default()
    }

    /// Extends this table; entries in the builder override existing prices.
    #[must_use]
    pub fn to_builder(&self) -> CostTableBuilder {
        CostTableBuilder {
            table: self.clone(),
        }
    }

    /// Returns `true` when both an input and an output price are known for `model`.
    #[must_use]
    pub fn supports(&self, model: &str) -> bool {
        self.input.contains_key(model) && self.output.contains_key(model)
    }

    /// Returns `(input, output)` per-token prices for `model`.
    #[must_use]
    pub fn prices(&self, model: &str) -> Option<(f64, f64)> {
        Some((*self.input.get(model)?, *self.output.get(model)?))
    }

    /// Iterates the models priced in both maps.
    pub fn models(&self) -> impl Iterator<Item = &str> {
        self.input
            .keys()
            .filter(|model| self.output.contains_key(model.as_str()))
            .map(String::as_str)
    }

    /// Prices a call, returning `(input_cost, output_cost)` in USD.
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError::UnsupportedModel`] if `model` is absent from
    /// either pricing map. Nothing is computed in that case.
    #[allow(clippy::cast_precision_loss)]
    pub fn cost_calculator(
        &self,
        input_tokens: u64,
        output_tokens: u64,
        model: &str,
    ) -> EngineResult<(f64, f64)> {
        let (input_price, output_price) = self
            .prices(model)
            .ok_or_else(|| GenerationError::unsupported_model(model))?;
        Ok((
            input_tokens as f64 * input_price,
            output_tokens as f64 * output_price,
        ))
    }
}

/// Builder for [`CostTable`].
#[derive(Clone, Debug, Default)]
pub struct CostTableBuilder {
    table: CostTable,
}

impl CostTableBuilder {
    /// Prices `model` from USD-per-million-token rates.
    #[must_use]
    pub fn model(self, model: impl Into<String>, input_per_million: f64, output_per_million: f64) -> Self {
        let model = model.into();
        self.input_price(model.clone(), input_per_million / PER_MILLION)
            .output_price(model, output_per_million / PER_MILLION)
    }

    /// Sets only the per-token input price of `model`.
    #[must_use]
    pub fn input_price(mut self, model: impl Into<String>, per_token: f64) -> Self {
        self.table.input.insert(model.into(), per_token);
        self
    }

    /// Sets only the per-token output price of `model`.
    #[must_use]
    pub fn output_price(mut self, model: impl Into<String>, per_token: f64) -> Self {
        self.table.output.insert(model.into(), per_token);
        self
    }

    /// Finalises the table.
    #[must_use]
    pub fn build(self) -> CostTable {
        self.table
    }
}
