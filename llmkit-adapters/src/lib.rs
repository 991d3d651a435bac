//! Model adapters that turn a formatted prompt into a model response.
//!
//! Each module exposes an implementation for a specific provider while sharing a
//! common trait-based interface defined in [`traits`].

#![warn(missing_docs, clippy::pedantic)]

pub mod ollama;
pub mod openai;
pub mod traits;

mod http_client;

pub use http_client::{DEFAULT_MAX_RETRY_DELAY, RetryPolicy};
