//! Request identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Correlates a generation request with its result and log lines.
///
/// Displays as a hyphenated UUID and serializes as the same string.
/// [`RequestId::short`] gives an eight-character prefix for compact logs.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generates a random (v4) identifier.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID, e.g. one received from an upstream caller.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Returns the first eight hex digits.
    #[must_use]
    pub fn short(&self) -> String {
        let mut buf = Uuid::encode_buffer();
        self.0.simple().encode_lower(&mut buf)[..8].to_owned()
    }

    /// Parses a UUID in any of its textual forms (hyphenated, simple, braced, urn).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequestId`] if `input` is not a UUID.
    pub fn parse(input: &str) -> Result<Self> {
        Ok(Self(Uuid::try_parse(input.trim())?))
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::random()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.hyphenated(), f)
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        Self::from_uuid(uuid)
    }
}

impl FromStr for RequestId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
