//! LLM generation toolkit facade.
//!
//! Depend on this crate via `cargo add llmkit`. It bundles the workspace crates
//! behind feature flags so downstream users only compile the layers they use.

#![warn(missing_docs, clippy::pedantic)]

/// Re-export shared primitives for convenience.
pub use llmkit_primitives as primitives;

/// Prompt templates and unit registry (enabled by `prompts` feature).
#[cfg(feature = "prompts")]
pub use llmkit_prompts as prompts;

/// Model provider adapters (enabled by `adapters` feature).
#[cfg(feature = "adapters")]
pub use llmkit_adapters as adapters;

/// Generation engine, pricing, and post-processing (enabled by `engine` feature).
#[cfg(feature = "engine")]
pub use llmkit_engine as engine;

/// Logging setup (enabled by `telemetry` feature).
#[cfg(feature = "telemetry")]
pub use llmkit_telemetry as telemetry;

/// YAML configuration (enabled by `config` feature).
#[cfg(feature = "config")]
pub use llmkit_config as config;
