//! PastelID identifiers.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Prefix every PastelID starts with.
pub const PASTEL_ID_PREFIX: &str = "jX";

/// Number of alphanumeric characters after the prefix.
pub const PASTEL_ID_BODY_LEN: usize = 84;

/// A supernode or end-user identifier.
///
/// Wire messages carry identifiers as plain strings and are not checked on
/// deserialization; use [`PastelId::parse`] where the format matters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PastelId(String);

impl PastelId {
    /// Parse a strictly formatted PastelID.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidPastelId`] if `value` is not `jX`
    /// followed by 84 ASCII alphanumerics.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        if is_valid_pastel_id(value) {
            Ok(Self(value.to_string()))
        } else {
            Err(ValidationError::InvalidPastelId(value.to_string()))
        }
    }

    /// Wrap an identifier without format checks.
    #[must_use]
    pub fn from_raw(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the identifier has the PastelID shape.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        is_valid_pastel_id(&self.0)
    }
}

/// Check the PastelID shape.
#[must_use]
pub fn is_valid_pastel_id(value: &str) -> bool {
    value
        .strip_prefix(PASTEL_ID_PREFIX)
        .is_some_and(|body| {
            body.len() == PASTEL_ID_BODY_LEN && body.bytes().all(|b| b.is_ascii_alphanumeric())
        })
}

impl fmt::Display for PastelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PastelId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for PastelId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
