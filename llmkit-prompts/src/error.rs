//! Error types for prompt templating and unit composition.

use std::collections::BTreeSet;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias for prompt operations.
pub type PromptResult<T> = Result<T, PromptError>;

/// Errors that can occur while parsing, formatting, or composing prompts.
#[derive(Debug, Error)]
pub enum PromptError {
    /// A `{` was found without a matching `}`.
    #[error("unmatched '{{' at position {position} in template")]
    UnmatchedBrace {
        /// Byte offset of the unmatched brace.
        position: usize,
    },

    /// A placeholder with no name (`{}`) was found.
    #[error("empty placeholder '{{}}' at position {position} in template")]
    EmptyPlaceholder {
        /// Byte offset of the empty placeholder.
        position: usize,
    },

    /// The template references names that were not supplied.
    #[error("missing data for placeholders: {names:?}")]
    MissingPlaceholder {
        /// Every referenced name without a value.
        names: BTreeSet<String>,
    },

    /// A unit name was requested that is not registered.
    #[error("unknown prompt unit `{name}`")]
    UnknownUnit {
        /// The requested unit name.
        name: String,
    },

    /// The same unit name appeared twice in a single YAML document.
    #[error("duplicate prompt unit `{name}` in unit document")]
    DuplicateUnit {
        /// The repeated unit name.
        name: String,
    },

    /// Reading a unit file failed.
    #[error("failed to read prompt units from {}: {source}", path.display())]
    Io {
        /// File that could not be read.
        path: PathBuf,
        /// Source [`std::io::Error`].
        #[source]
        source: std::io::Error,
    },

    /// A unit document was not valid YAML for the expected schema.
    #[error("invalid prompt unit document: {source}")]
    Yaml {
        /// Source [`serde_yaml::Error`].
        #[from]
        source: serde_yaml::Error,
    },
}
