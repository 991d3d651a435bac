//! Running totals over many generation results.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::result::GenerationResult;

/// Aggregated counters for a set of results.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct UsageTotals {
    /// Results recorded.
    pub calls: u64,
    /// Results with `success == false`.
    pub failures: u64,
    /// Sum of prompt tokens.
    pub input_tokens: u64,
    /// Sum of generated tokens.
    pub output_tokens: u64,
    /// Sum of all tokens.
    pub total_tokens: u64,
    /// Sum of costs in USD.
    pub total_cost: f64,
}

impl UsageTotals {
    fn add(&mut self, result: &GenerationResult) {
        self.calls += 1;
        if !result.success {
            self.failures += 1;
        }
        self.input_tokens = self.input_tokens.saturating_add(result.meta.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(result.meta.output_tokens);
        self.total_tokens = self.total_tokens.saturating_add(result.meta.total_tokens);
        self.total_cost += result.meta.total_cost;
    }
}

/// Usage accumulated overall and per operation name.
#[derive(Clone, Debug, Default, Serialize)]
pub struct UsageStats {
    totals: UsageTotals,
    by_operation: BTreeMap<String, UsageTotals>,
}

impl UsageStats {
    /// Creates empty statistics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one result.
    pub fn record(&mut self, result: &GenerationResult) {
        self.totals.add(result);
        if let Some(operation) = &result.operation_name {
            self.by_operation
                .entry(operation.clone())
                .or_default()
                .add(result);
        }
    }

    /// Totals across every recorded result.
    #[must_use]
    pub const fn totals(&self) -> &UsageTotals {
        &self.totals
    }

    /// Totals for results labelled `operation`.
    #[must_use]
    pub fn operation(&self, operation: &str) -> Option<&UsageTotals> {
        self.by_operation.get(operation)
    }

    /// Iterates per-operation totals in name order.
    pub fn operations(&self) -> impl Iterator<Item = (&str, &UsageTotals)> {
        self.by_operation
            .iter()
            .map(|(name, totals)| (name.as_str(), totals))
    }
}

impl<'a> Extend<&'a GenerationResult> for UsageStats {
    fn extend<I: IntoIterator<Item = &'a GenerationResult>>(&mut self, iter: I) {
        for result in iter {
            self.record(result);
        }
    }
}
