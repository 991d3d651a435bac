//! Named prompt units and their composition into templates.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PromptError, PromptResult};
use crate::template::{PlaceholderValues, PromptTemplate};

/// Unit holding the answer that a refinement pass works on.
pub const ANSWER_TO_BE_REFINED: &str = "answer_to_be_refined";
/// Unit describing what should be isolated from the answer.
pub const SEMANTIC_ELEMENT_FOR_EXTRACTION: &str = "semantic_element_for_extraction";
/// Unit carrying the refiner instruction.
pub const ANSWER_REFINER: &str = "answer_refiner";

/// A named, reusable fragment of a prompt template.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitSkeleton {
    /// Unique unit name used when crafting.
    pub name: String,
    /// Template text, possibly containing `{placeholder}` references.
    pub content: String,
    /// Free-form note about what the unit is for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// When set, the unit is dropped unless every placeholder it references
    /// has a value.
    #[serde(default)]
    pub conditional: bool,
}

impl UnitSkeleton {
    /// Creates an unconditional unit.
    #[must_use]
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            description: None,
            conditional: false,
        }
    }

    /// Attaches a description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Marks the unit as conditional on its placeholders being supplied.
    #[must_use]
    pub fn conditional(mut self) -> Self {
        self.conditional = true;
        self
    }

    fn is_satisfied_by(&self, values: &PlaceholderValues) -> PromptResult<bool> {
        if !self.conditional {
            return Ok(true);
        }
        let missing = PromptTemplate::new(self.content.as_str()).missing_placeholders(values)?;
        Ok(missing.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct UnitDocument {
    units: Vec<UnitSkeleton>,
}

/// Registry of unit skeletons that crafts unformatted prompts from unit names.
#[derive(Clone, Debug, Default)]
pub struct UnitRegistry {
    units: HashMap<String, UnitSkeleton>,
}

impl UnitRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry pre-populated with the units used by answer refinement.
    #[must_use]
    pub fn with_builtin_units() -> Self {
        let mut registry = Self::new();
        for unit in builtin_units() {
            registry.register(unit);
        }
        registry
    }

    /// Inserts a unit, replacing any existing unit with the same name.
    pub fn register(&mut self, unit: UnitSkeleton) {
        self.units.insert(unit.name.clone(), unit);
    }

    /// Returns the unit registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&UnitSkeleton> {
        self.units.get(name)
    }

    /// Returns `true` if a unit named `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.units.contains_key(name)
    }

    /// Returns the number of registered units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Returns `true` when no units are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Loads unit skeletons from a YAML file.
    ///
    /// The document must have a top-level `units` list. Units override earlier
    /// registrations with the same name.
    ///
    /// # Errors
    ///
    /// Returns [`PromptError::Io`] if the file cannot be read, or any error from
    /// [`UnitRegistry::load_unit_skeletons_from_str`].
    pub fn load_unit_skeletons_from_yaml(&mut self, path: impl AsRef<Path>) -> PromptResult<usize> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| PromptError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let loaded = self.load_unit_skeletons_from_str(&content)?;
        debug!(path = %path.display(), units = loaded, "loaded prompt units");
        Ok(loaded)
    }

    /// Loads unit skeletons from a YAML string, returning how many were loaded.
    ///
    /// # Errors
    ///
    /// Returns [`PromptError::Yaml`] for malformed documents and
    /// [`PromptError::DuplicateUnit`] when a name repeats within the document.
    /// Nothing is registered when an error is returned.
    pub fn load_unit_skeletons_from_str(&mut self, yaml: &str) -> PromptResult<usize> {
        let document: UnitDocument = serde_yaml::from_str(yaml)?;

        let mut seen = HashSet::new();
        for unit in &document.units {
            if !seen.insert(unit.name.as_str()) {
                return Err(PromptError::DuplicateUnit {
                    name: unit.name.clone(),
                });
            }
        }

        let count = document.units.len();
        for unit in document.units {
            self.register(unit);
        }
        Ok(count)
    }

    /// Composes the named units, in order, into an unformatted prompt.
    ///
    /// Placeholders are left in place; `placeholder_values` only decides whether
    /// conditional units are included. Included units are joined with a newline.
    ///
    /// # Errors
    ///
    /// Returns [`PromptError::UnknownUnit`] for unregistered names, or a syntax
    /// error if a conditional unit's content is malformed.
    pub fn craft<S: AsRef<str>>(
        &self,
        units: &[S],
        placeholder_values: &PlaceholderValues,
    ) -> PromptResult<String> {
        let mut parts = Vec::with_capacity(units.len());
        for name in units {
            let name = name.as_ref();
            let unit = self.units.get(name).ok_or_else(|| PromptError::UnknownUnit {
                name: name.to_owned(),
            })?;

            if unit.is_satisfied_by(placeholder_values)? {
                parts.push(unit.content.as_str());
            } else {
                debug!(unit = name, "skipping conditional unit without values");
            }
        }
        Ok(parts.join("\n"))
    }
}

fn builtin_units() -> [UnitSkeleton; 3] {
    [
        UnitSkeleton::new(
            ANSWER_TO_BE_REFINED,
            "Here is an answer produced earlier:\n{answer_to_be_refined}",
        )
        .with_description("The prior answer that should be refined."),
        UnitSkeleton::new(
            SEMANTIC_ELEMENT_FOR_EXTRACTION,
            "Isolate the following element from that answer: {semantic_element_for_extraction}",
        )
        .with_description("What to extract from the prior answer."),
        UnitSkeleton::new(
            ANSWER_REFINER,
            "Respond with only the isolated element, without any commentary or formatting.",
        )
        .with_description("Refiner instruction."),
    ]
}
