//! Best-effort conversion of model output into a JSON object.

use serde_json::{Map, Value};
use thiserror::Error;

/// Text could not be turned into a mapping.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("could not parse a mapping from model output: {reason}")]
pub struct ParseError {
    reason: String,
}

impl ParseError {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// Returns the parser's explanation.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Parses loosely structured model output into a key/value mapping.
///
/// The parser strips markdown code fences, isolates the outermost `{...}`
/// span, and tries strict JSON first. When that fails it retries after
/// rewriting Python literal syntax: single-quoted strings, `True`, `False`,
/// `None`, and trailing commas.
#[derive(Clone, Copy, Debug, Default)]
pub struct DictParser;

impl DictParser {
    /// Creates a parser.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Converts `text` into a mapping.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] when no object can be recovered from the text.
    pub fn run(&self, text: &str) -> Result<Map<String, Value>, ParseError> {
        let candidate = object_span(strip_code_fence(text))
            .ok_or_else(|| ParseError::new("no `{...}` object found"))?;

        let value = match serde_json::from_str::<Value>(candidate) {
            Ok(value) => value,
            Err(strict) => serde_json::from_str::<Value>(&pythonish_to_json(candidate))
                .map_err(|_| ParseError::new(strict.to_string()))?,
        };

        match value {
            Value::Object(map) => Ok(map),
            other => Err(ParseError::new(format!("expected an object, found {other}"))),
        }
    }
}

fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string (`json`, `python`, ...) on the opening line.
    let body = rest.split_once('\n').map_or(rest, |(_, body)| body);
    body.rfind("```").map_or(body, |end| &body[..end]).trim()
}

fn object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn pythonish_to_json(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' | '\'' => {
                out.push('"');
                while let Some(inner) = chars.next() {
                    match inner {
                        '\\' => match chars.next() {
                            Some('\'') => out.push('\''),
                            Some(escaped) => {
                                out.push('\\');
                                out.push(escaped);
                            }
                            None => out.push('\\'),
                        },
                        c if c == ch => break,
                        '"' => out.push_str("\\\""),
                        '\n' => out.push_str("\\n"),
                        '\r' => out.push_str("\\r"),
                        '\t' => out.push_str("\\t"),
                        c => out.push(c),
                    }
                }
                out.push('"');
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut word = String::from(c);
                while let Some(&next) = chars.peek() {
                    if next.is_ascii_alphanumeric() || next == '_' {
                        word.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                out.push_str(match word.as_str() {
                    "True" => "true",
                    "False" => "false",
                    "None" => "null",
                    other => other,
                });
            }
            ',' => {
                let closes = chars
                    .clone()
                    .find(|c| !c.is_whitespace())
                    .is_some_and(|c| c == '}' || c == ']');
                if !closes {
                    out.push(',');
                }
            }
            c => out.push(c),
        }
    }
    out
}
