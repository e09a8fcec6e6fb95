//! Merge-policy configuration (`--config <file>.toml`).
//!
//! Defines the typed configuration for the matcher registry, the
//! document-level attribute names, and the fold protocol. Everything has a
//! built-in lexicon default; a missing file is not an error.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;

use serde::Deserialize;

use crate::document::{
    DEFAULT_ID_ATTRIBUTE, DEFAULT_MARKER_TAG, DEFAULT_MODIFIED_ATTRIBUTE, DocumentMerger,
};
use crate::fold::{DEFAULT_UPDATE_SUFFIX, FoldOptions};
use crate::merge::matcher::Matcher;
use crate::merge::strategy::{ElementStrategy, StrategyRegistry};
use crate::model::types::TagName;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level merge configuration.
///
/// Parsed from the TOML file named by `--config`. Missing fields use the
/// built-in lexicon defaults. Missing file → all defaults (no error).
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LexmergeConfig {
    /// Matcher registry settings.
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Document-level attribute names.
    #[serde(default)]
    pub document: DocumentConfig,

    /// Fold protocol settings.
    #[serde(default)]
    pub fold: FoldConfig,
}

// ---------------------------------------------------------------------------
// RegistryConfig
// ---------------------------------------------------------------------------

/// Which tags pair by what.
///
/// ```toml
/// [registry.keys]
/// entry = "id"
/// form = "lang"
///
/// [registry]
/// singletons = ["text", "gram-info"]
/// silent = ["form"]
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryConfig {
    /// Per-tag key attributes: elements with these tags pair by the named
    /// attribute's value.
    #[serde(default = "default_keys")]
    pub keys: BTreeMap<String, String>,

    /// Tags that occur at most once per parent and pair by tag alone.
    #[serde(default = "default_singletons")]
    pub singletons: Vec<String>,

    /// Tags whose conflicts resolve silently (local side wins without a
    /// report). Tags listed here but nowhere else pair by subtree equality.
    #[serde(default)]
    pub silent: Vec<String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            keys: default_keys(),
            singletons: default_singletons(),
            silent: Vec::new(),
        }
    }
}

fn default_keys() -> BTreeMap<String, String> {
    [
        ("entry", "id"),
        ("sense", "id"),
        ("form", "lang"),
        ("gloss", "lang"),
        ("field", "type"),
        ("trait", "name"),
    ]
    .into_iter()
    .map(|(tag, key)| (tag.to_owned(), key.to_owned()))
    .collect()
}

fn default_singletons() -> Vec<String> {
    vec![
        "text".to_owned(),
        "gram-info".to_owned(),
        "definition".to_owned(),
    ]
}

impl RegistryConfig {
    /// Build the strategy table this section describes.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when a configured tag is not a valid
    /// element name.
    pub fn to_registry(&self) -> Result<StrategyRegistry, ConfigError> {
        let silent: HashSet<&str> = self.silent.iter().map(String::as_str).collect();
        let pick = |tag: &str, matcher: Matcher| {
            if silent.contains(tag) {
                ElementStrategy::silent(matcher)
            } else {
                ElementStrategy::new(matcher)
            }
        };

        let mut registry = StrategyRegistry::new();
        for (tag, key) in &self.keys {
            registry.register(
                parse_tag(tag)?,
                pick(tag, Matcher::KeyAttribute { key: key.clone() }),
            );
        }
        for tag in &self.singletons {
            registry.register(parse_tag(tag)?, pick(tag, Matcher::SingletonTag));
        }
        for tag in &self.silent {
            if !self.keys.contains_key(tag) && !self.singletons.contains(tag) {
                registry.register(
                    parse_tag(tag)?,
                    ElementStrategy::silent(Matcher::SubtreeEquality),
                );
            }
        }
        Ok(registry)
    }
}

fn parse_tag(tag: &str) -> Result<TagName, ConfigError> {
    TagName::new(tag).map_err(|err| ConfigError {
        path: None,
        message: format!("invalid tag name {tag:?}: {err}"),
    })
}

// ---------------------------------------------------------------------------
// DocumentConfig
// ---------------------------------------------------------------------------

/// Attribute names the document layer relies on.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DocumentConfig {
    /// Attribute carrying the stable record identifier.
    #[serde(default = "default_id_attribute")]
    pub id_attribute: String,

    /// Attribute trusted for the cheap no-divergence check.
    #[serde(default = "default_modified_attribute")]
    pub modified_attribute: String,

    /// Tag of the synthetic child preserving a losing record revision.
    #[serde(default = "default_marker_tag")]
    pub marker_tag: String,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            id_attribute: default_id_attribute(),
            modified_attribute: default_modified_attribute(),
            marker_tag: default_marker_tag(),
        }
    }
}

fn default_id_attribute() -> String {
    DEFAULT_ID_ATTRIBUTE.to_owned()
}

fn default_modified_attribute() -> String {
    DEFAULT_MODIFIED_ATTRIBUTE.to_owned()
}

fn default_marker_tag() -> String {
    DEFAULT_MARKER_TAG.to_owned()
}

// ---------------------------------------------------------------------------
// FoldConfig
// ---------------------------------------------------------------------------

/// Fold protocol settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FoldConfig {
    /// Token between the base name and the `-` in update-file names.
    #[serde(default = "default_update_suffix")]
    pub update_suffix: String,
}

impl Default for FoldConfig {
    fn default() -> Self {
        Self {
            update_suffix: default_update_suffix(),
        }
    }
}

fn default_update_suffix() -> String {
    DEFAULT_UPDATE_SUFFIX.to_owned()
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

impl LexmergeConfig {
    /// A document merger wired up from this configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the registry or the marker tag is
    /// invalid.
    pub fn document_merger(&self) -> Result<DocumentMerger, ConfigError> {
        // The marker tag must itself serialize as an element.
        parse_tag(&self.document.marker_tag)?;
        Ok(DocumentMerger::new(self.registry.to_registry()?)
            .with_id_attribute(&self.document.id_attribute)
            .with_modified_attribute(&self.document.modified_attribute)
            .with_marker_tag(&self.document.marker_tag))
    }

    /// Fold options wired up from this configuration.
    #[must_use]
    pub fn fold_options(&self) -> FoldOptions {
        FoldOptions::new()
            .with_id_attribute(&self.document.id_attribute)
            .with_update_suffix(&self.fold.update_suffix)
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Error loading a merge configuration file.
#[derive(Debug)]
pub struct ConfigError {
    /// The path that was being loaded (if available).
    pub path: Option<std::path::PathBuf>,
    /// Human-readable message with line-level detail when possible.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(p) = &self.path {
            write!(f, "{}: {}", p.display(), self.message)
        } else {
            write!(f, "config error: {}", self.message)
        }
    }
}

impl std::error::Error for ConfigError {}

impl LexmergeConfig {
    /// Load configuration from a TOML file.
    ///
    /// - If the file does not exist, returns all defaults (not an error).
    /// - If the file exists but contains invalid TOML or unknown fields,
    ///   returns a [`ConfigError`] with line-level detail.
    ///
    /// # Errors
    /// Returns `ConfigError` on I/O errors (other than not-found) or parse
    /// errors.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError {
                    path: Some(path.to_owned()),
                    message: format!("could not read file: {e}"),
                });
            }
        };
        Self::parse(&contents).map_err(|mut e| {
            e.path = Some(path.to_owned());
            e
        })
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `ConfigError` on invalid TOML or unknown fields.
    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| {
            let mut message = e.message().to_owned();
            if let Some(span) = e.span() {
                // Line number from the byte offset.
                let line = toml_str[..span.start]
                    .chars()
                    .filter(|&c| c == '\n')
                    .count()
                    + 1;
                message = format!("line {line}: {message}");
            }
            ConfigError { path: None, message }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
