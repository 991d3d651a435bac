//! Configuration management for llmkit.
//!
//! An [`EngineConfig`] is read from YAML, adjusted from the environment,
//! validated, and then turned into a ready [`GenerationEngine`](llmkit_engine::GenerationEngine).

#![warn(missing_docs, clippy::pedantic)]

pub mod loader;
pub mod schema;

pub use loader::{LLMKIT_LOG_ENV, LLMKIT_MODEL_ENV};
pub use schema::{EngineConfig, OllamaSettings, OpenAiSettings, PricingEntry, Provider};
