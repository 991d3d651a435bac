//! Brace-delimited prompt templates with placeholder introspection.
//!
//! # Syntax
//!
//! - `{name}` substitutes the value supplied for `name`; whitespace inside the
//!   braces is trimmed.
//! - `{{` and `}}` render as literal `{` and `}`.
//! - A lone `}` is kept as a regular character.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PromptError, PromptResult};

/// Mapping of placeholder name to the value substituted for it.
pub type PlaceholderValues = HashMap<String, String>;

/// A prompt template with `{name}` placeholders.
///
/// # Examples
///
/// ```
/// use llmkit_prompts::{PlaceholderValues, PromptTemplate};
///
/// let template = PromptTemplate::new("Hello {name}, today is {day}.");
/// let mut values = PlaceholderValues::new();
/// values.insert("name".to_owned(), "Ana".to_owned());
/// values.insert("day".to_owned(), "Monday".to_owned());
///
/// assert_eq!(template.format(&values).unwrap(), "Hello Ana, today is Monday.");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptTemplate {
    template: String,
}

#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    Literal(char),
    Placeholder(&'a str),
}

impl PromptTemplate {
    /// Creates a template from the supplied text.
    #[must_use]
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Returns the raw template string.
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Returns the set of placeholder names referenced by the template.
    ///
    /// # Errors
    ///
    /// Returns [`PromptError::UnmatchedBrace`] or [`PromptError::EmptyPlaceholder`]
    /// when the template is malformed.
    pub fn placeholders(&self) -> PromptResult<BTreeSet<String>> {
        Ok(segments(&self.template)?
            .into_iter()
            .filter_map(|segment| match segment {
                Segment::Placeholder(name) => Some(name.to_owned()),
                Segment::Literal(_) => None,
            })
            .collect())
    }

    /// Returns the referenced placeholder names that have no entry in `values`.
    ///
    /// # Errors
    ///
    /// Returns a syntax error when the template is malformed.
    pub fn missing_placeholders(&self, values: &PlaceholderValues) -> PromptResult<BTreeSet<String>> {
        Ok(self
            .placeholders()?
            .into_iter()
            .filter(|name| !values.contains_key(name))
            .collect())
    }

    /// Checks that every referenced placeholder has a value.
    ///
    /// # Errors
    ///
    /// Returns [`PromptError::MissingPlaceholder`] listing every absent name, or a
    /// syntax error when the template is malformed.
    pub fn validate(&self, values: &PlaceholderValues) -> PromptResult<()> {
        let names = self.missing_placeholders(values)?;
        if names.is_empty() {
            Ok(())
        } else {
            Err(PromptError::MissingPlaceholder { names })
        }
    }

    /// Renders the template, substituting every placeholder from `values`.
    ///
    /// Values for names the template does not reference are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`PromptError::MissingPlaceholder`] if any referenced name has no
    /// value, or a syntax error when the template is malformed.
    pub fn format(&self, values: &PlaceholderValues) -> PromptResult<String> {
        let segments = segments(&self.template)?;
        let mut missing = BTreeSet::new();
        let mut rendered = String::with_capacity(self.template.len());

        for segment in segments {
            match segment {
                Segment::Literal(ch) => rendered.push(ch),
                Segment::Placeholder(name) => match values.get(name) {
                    Some(value) => rendered.push_str(value),
                    None => {
                        missing.insert(name.to_owned());
                    }
                },
            }
        }

        if missing.is_empty() {
            Ok(rendered)
        } else {
            Err(PromptError::MissingPlaceholder { names: missing })
        }
    }
}

impl fmt::Display for PromptTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}

impl From<&str> for PromptTemplate {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for PromptTemplate {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

fn segments(template: &str) -> PromptResult<Vec<Segment<'_>>> {
    let mut out = Vec::new();
    let mut chars = template.char_indices().peekable();

    while let Some((pos, ch)) = chars.next() {
        match ch {
            '{' => {
                if let Some((_, '{')) = chars.peek() {
                    chars.next();
                    out.push(Segment::Literal('{'));
                    continue;
                }

                let start = pos + ch.len_utf8();
                let end = loop {
                    match chars.next() {
                        Some((end, '}')) => break end,
                        Some(_) => {}
                        None => return Err(PromptError::UnmatchedBrace { position: pos }),
                    }
                };

                let name = template[start..end].trim();
                if name.is_empty() {
                    return Err(PromptError::EmptyPlaceholder { position: pos });
                }
                out.push(Segment::Placeholder(name));
            }
            '}' => {
                if let Some((_, '}')) = chars.peek() {
                    chars.next();
                }
                out.push(Segment::Literal('}'));
            }
            _ => out.push(Segment::Literal(ch)),
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values<const N: usize>(pairs: [(&str, &str); N]) -> PlaceholderValues {
        pairs
            .into_iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect()
    }

    #[test]
    fn formats_simple_template() {
        let template = PromptTemplate::new("Hello {name}, today is {day}.");
        let rendered = template
            .format(&values([("name", "Ana"), ("day", "Monday")]))
            .unwrap();
        assert_eq!(rendered, "Hello Ana, today is Monday.");
    }

    #[test]
    fn lists_placeholders_once() {
        let template = PromptTemplate::new("{x}-{y}-{x} { z }");
        let names: Vec<_> = template.placeholders().unwrap().into_iter().collect();
        assert_eq!(names, vec!["x", "y", "z"]);
    }

    #[test]
    fn escaped_braces_are_not_placeholders() {
        let template = PromptTemplate::new("Return {{\"result\": {value}}}");
        assert_eq!(
            template.placeholders().unwrap(),
            BTreeSet::from(["value".to_owned()])
        );
        let rendered = template.format(&values([("value", "ok")])).unwrap();
        assert_eq!(rendered, "Return {\"result\": ok}");
    }

    #[test]
    fn missing_values_are_all_reported() {
        let template = PromptTemplate::new("{a} {b} {c}");
        let err = template
            .format(&values([("b", "B")]))
            .expect_err("a and c are missing");
        match err {
            PromptError::MissingPlaceholder { names } => {
                assert_eq!(names, BTreeSet::from(["a".to_owned(), "c".to_owned()]));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn extra_values_are_ignored() {
        let template = PromptTemplate::new("Only {one}");
        let rendered = template
            .format(&values([("one", "1"), ("two", "2")]))
            .unwrap();
        assert_eq!(rendered, "Only 1");
    }

    #[test]
    fn unmatched_brace_reports_position() {
        let err = PromptTemplate::new("Hello {name")
            .placeholders()
            .expect_err("unterminated");
        assert!(matches!(err, PromptError::UnmatchedBrace { position: 6 }));
    }

    #[test]
    fn empty_placeholder_is_rejected() {
        let err = PromptTemplate::new("Hello { }")
            .placeholders()
            .expect_err("empty name");
        assert!(matches!(err, PromptError::EmptyPlaceholder { position: 6 }));
    }

    #[test]
    fn lone_closing_brace_is_literal() {
        let template = PromptTemplate::new("a } b");
        assert_eq!(template.format(&PlaceholderValues::new()).unwrap(), "a } b");
    }

    #[test]
    fn validate_matches_format() {
        let template = PromptTemplate::new("{greeting} {name}");
        assert!(template.validate(&values([("greeting", "hi"), ("name", "x")])).is_ok());
        assert!(matches!(
            template.validate(&values([("greeting", "hi")])),
            Err(PromptError::MissingPlaceholder { .. })
        ));
    }

    #[test]
    fn multibyte_text_survives() {
        let template = PromptTemplate::new("¿{pregunta}? ✓");
        let rendered = template.format(&values([("pregunta", "qué")])).unwrap();
        assert_eq!(rendered, "¿qué? ✓");
    }
}
