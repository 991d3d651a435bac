//! Generation engine for llmkit.
//!
//! The engine coordinates one round trip from prompt template to structured
//! result: it checks that every placeholder has a value, formats the prompt,
//! times the model call, prices the reported token usage, and optionally
//! post-processes or refines the generated text.

#![warn(missing_docs, clippy::pedantic)]

mod cost;
mod dict_parser;
mod engine;
mod error;
mod postprocess;
mod request;
mod result;
mod usage;

pub use cost::{CostTable, CostTableBuilder};
pub use dict_parser::{DictParser, ParseError};
pub use engine::{GenerationEngine, INVOCATION_FAILED, InvocationOutcome};
pub use error::{EngineResult, GenerationError};
pub use postprocess::{OutputTransform, PostprocessConfig, PostprocessError, RefinementConfig};
pub use request::GenerationRequest;
pub use result::{GenerationMeta, GenerationResult, ResponseType};
pub use usage::{UsageStats, UsageTotals};
