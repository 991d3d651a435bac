//! Prompt templating for llmkit.
//!
//! Two layers live here:
//!
//! - [`PromptTemplate`]: a template string with `{name}` placeholders that can be
//!   introspected and formatted against a value map.
//! - [`UnitRegistry`]: named, reusable prompt fragments ("units") that are composed
//!   in caller-specified order into an unformatted template.

#![warn(missing_docs, clippy::pedantic)]

mod error;
pub mod template;
pub mod units;

pub use error::{PromptError, PromptResult};
pub use template::{PlaceholderValues, PromptTemplate};
pub use units::{UnitRegistry, UnitSkeleton};
