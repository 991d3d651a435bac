//! Core shared types for llmkit crates.

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod ids;

/// Error type and result alias shared across the workspace.
pub use error::{Error, Result};
/// Identifier attached to every generation request.
pub use ids::RequestId;
