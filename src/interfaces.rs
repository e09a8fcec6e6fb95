//! Seams for host applications.
//!
//! The merge core stays ignorant of schemas, dialect versions, and storage
//! backends. Hosts plug those concerns in through the traits here; the
//! defaults do nothing.

use std::path::Path;

use thiserror::Error;

use crate::model::tree::{NodeId, Tree};
use crate::model::types::RecordId;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Checks a document file against an external schema or tool.
///
/// The fold protocol consults the validator only as a diagnostic, after a
/// fold step has already failed: the verdict distinguishes a malformed
/// update file from a folding bug. Validation never gates a merge.
pub trait DocumentValidator {
    /// Human-readable findings for the file at `path`, or `None` when it
    /// passes (or cannot be judged).
    fn validate(&self, path: &Path) -> Option<String>;
}

/// The default validator: accepts everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoValidator;

impl DocumentValidator for NoValidator {
    fn validate(&self, _path: &Path) -> Option<String> {
        None
    }
}

// ---------------------------------------------------------------------------
// Migration
// ---------------------------------------------------------------------------

/// A document could not be brought up to the latest dialect version.
#[derive(Debug, Error)]
#[error("cannot migrate document from version {from:?}: {reason}")]
pub struct MigrationError {
    /// The version attribute found on the root element.
    pub from: String,
    /// What went wrong.
    pub reason: String,
}

/// Rewrites documents from older dialect versions.
///
/// The merge core treats the root version attribute as opaque and never
/// migrates on its own; callers migrate all three inputs first.
pub trait DocumentMigrator {
    /// Whether `document` predates the latest dialect version.
    fn needs_migration(&self, document: &Tree) -> bool;

    /// Rewrite `document` in the latest dialect.
    ///
    /// # Errors
    ///
    /// Fails when the document's version is unknown or the rewrite cannot
    /// be expressed.
    fn migrate_to_latest(&self, document: Tree) -> Result<Tree, MigrationError>;
}

// ---------------------------------------------------------------------------
// Record streaming
// ---------------------------------------------------------------------------

/// Receives records one at a time as a reader walks a document.
///
/// Useful for hosts that index or copy records without holding a second
/// materialized document.
pub trait RecordSink {
    /// Called once per record, in document order. `node` belongs to
    /// `document`.
    fn record(&mut self, id: &RecordId, document: &Tree, node: NodeId);
}

impl<F> RecordSink for F
where
    F: FnMut(&RecordId, &Tree, NodeId),
{
    fn record(&mut self, id: &RecordId, document: &Tree, node: NodeId) {
        self(id, document, node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_validator_accepts_everything() {
        let validator = NoValidator;
        assert_eq!(validator.validate(Path::new("/nonexistent")), None);
    }

    #[test]
    fn closures_are_record_sinks() {
        let tree = Tree::new("lexicon");
        let id = RecordId::new("e1").unwrap();
        let mut seen = Vec::new();
        let mut sink = |record_id: &RecordId, _: &Tree, node: NodeId| {
            seen.push((record_id.clone(), node));
        };
        RecordSink::record(&mut sink, &id, &tree, tree.root());
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0.as_str(), "e1");
    }

    #[test]
    fn migration_error_names_the_version() {
        let err = MigrationError {
            from: "0.12".into(),
            reason: "no upgrade path".into(),
        };
        assert!(err.to_string().contains("0.12"));
    }
}
