//! Post-processing and refinement settings applied after a successful call.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::dict_parser::{DictParser, ParseError};

/// Failures while turning generated text into a structured value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PostprocessError {
    /// The text could not be parsed into a mapping.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The requested key is absent from the parsed mapping.
    #[error("key `{key}` not found in parsed output")]
    KeyNotFound {
        /// Key that was looked up.
        key: String,
    },

    /// A key was requested but the value is not a mapping.
    #[error("cannot extract key `{key}`: output was not converted to a mapping")]
    NotAMapping {
        /// Key that was looked up.
        key: String,
    },

    /// The extracted value does not occur verbatim in the generated text.
    #[error("extracted value {value} does not appear in the generated text")]
    ValidationFailed {
        /// The rejected value, rendered as JSON.
        value: String,
    },
}

/// Independently toggleable post-processing options.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostprocessConfig {
    /// Parse the text into a mapping.
    pub postprocess_to_dict: bool,
    /// Index the parsed mapping by this key.
    pub extract_content_with_a_key: Option<String>,
    /// Require the extracted value to occur verbatim in the generated text.
    pub string_match_validation: bool,
}

impl PostprocessConfig {
    /// Parses the output into a mapping.
    #[must_use]
    pub fn to_dict() -> Self {
        Self {
            postprocess_to_dict: true,
            ..Self::default()
        }
    }

    /// Parses the output and keeps the value under `key`.
    #[must_use]
    pub fn extract_key(key: impl Into<String>) -> Self {
        Self {
            postprocess_to_dict: true,
            extract_content_with_a_key: Some(key.into()),
            string_match_validation: false,
        }
    }

    /// Enables verbatim-match validation of the extracted value.
    #[must_use]
    pub fn with_string_match_validation(mut self) -> Self {
        self.string_match_validation = true;
        self
    }

    /// Returns `true` when no option is enabled.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        !self.postprocess_to_dict
            && self.extract_content_with_a_key.is_none()
            && !self.string_match_validation
    }

    /// Applies the enabled options to `text`.
    ///
    /// Returns `None` when nothing was enabled.
    ///
    /// # Errors
    ///
    /// See [`PostprocessError`].
    pub fn apply(&self, parser: &DictParser, text: &str) -> Result<Option<Value>, PostprocessError> {
        let mut value = if self.postprocess_to_dict {
            Some(Value::Object(parser.run(text)?))
        } else {
            None
        };

        if let Some(key) = &self.extract_content_with_a_key {
            let Some(Value::Object(map)) = &value else {
                return Err(PostprocessError::NotAMapping { key: key.clone() });
            };
            let extracted = map
                .get(key)
                .cloned()
                .ok_or_else(|| PostprocessError::KeyNotFound { key: key.clone() })?;
            value = Some(extracted);
        }

        if self.string_match_validation {
            if let Some(extracted) = &value {
                validate_occurs_in(text, extracted)?;
            }
        }

        Ok(value)
    }
}

// Containers are checked element by element against the text.
fn validate_occurs_in(text: &str, value: &Value) -> Result<(), PostprocessError> {
    let found = match value {
        Value::Null => true,
        Value::String(s) => text.contains(s.as_str()),
        Value::Bool(_) | Value::Number(_) => text.contains(&value.to_string()),
        Value::Array(items) => return items.iter().try_for_each(|item| validate_occurs_in(text, item)),
        Value::Object(map) => return map.values().try_for_each(|item| validate_occurs_in(text, item)),
    };
    if found {
        Ok(())
    } else {
        Err(PostprocessError::ValidationFailed {
            value: value.to_string(),
        })
    }
}

/// Instructions for a refinement pass that isolates part of a prior answer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefinementConfig {
    /// Description of the element to isolate.
    pub semantic_element_for_extraction: String,
}

impl RefinementConfig {
    /// Creates a refinement targeting `element`.
    #[must_use]
    pub fn new(element: impl Into<String>) -> Self {
        Self {
            semantic_element_for_extraction: element.into(),
        }
    }
}

/// What to do with generated text after a successful call.
///
/// Post-processing and refinement are mutually exclusive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputTransform {
    /// Parse and extract structured data locally.
    Postprocess(PostprocessConfig),
    /// Ask the model to isolate an element of its answer.
    Refine(RefinementConfig),
}

impl From<PostprocessConfig> for OutputTransform {
    fn from(config: PostprocessConfig) -> Self {
        Self::Postprocess(config)
    }
}

impl From<RefinementConfig> for OutputTransform {
    fn from(config: RefinementConfig) -> Self {
        Self::Refine(config)
    }
}
