//! Core identifier types for lexmerge.
//!
//! Validated newtypes used throughout the crate: record identifiers (the
//! stable id attribute on top-level records) and element tag names (registry
//! and configuration keys).

use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RecordId
// ---------------------------------------------------------------------------

/// A validated record identifier.
///
/// The value of the id attribute on a top-level record element. Any non-empty
/// string without surrounding whitespace or control characters is accepted;
/// producers typically use GUIDs but the merge never assumes a shape beyond
/// stability.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecordId(String);

impl RecordId {
    /// Create a new `RecordId` from a string, validating format.
    ///
    /// # Errors
    /// Returns an error if the string is empty, has surrounding whitespace,
    /// or contains control characters.
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        Self::validate(s)?;
        Ok(Self(s.to_owned()))
    }

    /// Return the identifier as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(s: &str) -> Result<(), ValidationError> {
        if s.is_empty() {
            return Err(ValidationError {
                kind: ErrorKind::RecordId,
                value: s.to_owned(),
                reason: "record id must not be empty".to_owned(),
            });
        }
        if s.trim() != s {
            return Err(ValidationError {
                kind: ErrorKind::RecordId,
                value: s.to_owned(),
                reason: "record id must not start or end with whitespace".to_owned(),
            });
        }
        if s.chars().any(char::is_control) {
            return Err(ValidationError {
                kind: ErrorKind::RecordId,
                value: s.to_owned(),
                reason: "record id must not contain control characters".to_owned(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RecordId {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for RecordId {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::validate(&s)?;
        Ok(Self(s))
    }
}

impl From<RecordId> for String {
    fn from(id: RecordId) -> Self {
        id.0
    }
}

// ---------------------------------------------------------------------------
// TagName
// ---------------------------------------------------------------------------

/// A validated element tag name.
///
/// Keys in the strategy registry and in configuration. Restricted to the
/// ASCII subset of XML names: a letter or underscore followed by letters,
/// digits, hyphens, underscores, periods, or colons.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TagName(String);

impl TagName {
    /// Create a new `TagName` from a string, validating format.
    ///
    /// # Errors
    /// Returns an error if the string is not a valid ASCII XML name.
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        Self::validate(s)?;
        Ok(Self(s.to_owned()))
    }

    /// Return the tag name as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(s: &str) -> Result<(), ValidationError> {
        let mut chars = s.chars();
        let Some(first) = chars.next() else {
            return Err(ValidationError {
                kind: ErrorKind::TagName,
                value: s.to_owned(),
                reason: "tag name must not be empty".to_owned(),
            });
        };
        if !(first.is_ascii_alphabetic() || first == '_') {
            return Err(ValidationError {
                kind: ErrorKind::TagName,
                value: s.to_owned(),
                reason: "tag name must start with a letter or underscore".to_owned(),
            });
        }
        if !chars.all(is_name_char) {
            return Err(ValidationError {
                kind: ErrorKind::TagName,
                value: s.to_owned(),
                reason:
                    "tag name must contain only letters, digits, hyphens, underscores, periods, and colons"
                        .to_owned(),
            });
        }
        Ok(())
    }
}

/// Character class for the tail of an ASCII XML name.
#[must_use]
pub const fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':')
}

impl fmt::Display for TagName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TagName {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for TagName {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::validate(&s)?;
        Ok(Self(s))
    }
}

impl From<TagName> for String {
    fn from(tag: TagName) -> Self {
        tag.0
    }
}

// Registry maps keyed by `TagName` stay addressable by plain `&str` tags
// coming out of parsed trees.
impl Borrow<str> for TagName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Validation errors
// ---------------------------------------------------------------------------

/// The kind of value that failed validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// A [`RecordId`] validation error.
    RecordId,
    /// A [`TagName`] validation error.
    TagName,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RecordId => write!(f, "RecordId"),
            Self::TagName => write!(f, "TagName"),
        }
    }
}

/// A validation error for lexmerge core types.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError {
    /// What kind of value was being validated.
    pub kind: ErrorKind,
    /// The invalid value.
    pub value: String,
    /// Human-readable explanation.
    pub reason: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid {}: {:?} — {}",
            self.kind, self.value, self.reason
        )
    }
}

impl std::error::Error for ValidationError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
