//! The incremental file-merge protocol.
//!
//! A base document accumulates timestamped sibling update files
//! (`<base>.update-<token>`). [`fold_updates`] replays them oldest first,
//! replacing whole records (the later file wins), then swaps the result in
//! behind a backup. The base is never left half-written: every failure
//! either happens before the commit or rolls the backup into place.
//!
//! Folding is deliberately coarser than the three-way merge: update files
//! are produced by a single writer whose newer record is authoritative, so
//! records are replaced wholesale, never field-merged, and no conflicts
//! arise.

mod commit;
mod update;

pub use update::UpdateFile;

use std::collections::{HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;
use thiserror::Error;

use crate::document::{DEFAULT_ID_ATTRIBUTE, DocumentError, DocumentSide, records_by_id};
use crate::interfaces::DocumentValidator;
use crate::merge::engine::MergeError;
use crate::model::tree::{NodeId, Tree};
use crate::model::types::RecordId;
use crate::xml::{parse_document, write_document};

/// Default token between the base name and the `-` in update-file names.
pub const DEFAULT_UPDATE_SUFFIX: &str = "update";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Fatal fold failures. All of them leave the base file as it was, except
/// the double fault, which says exactly where the content went.
#[derive(Debug, Error)]
pub enum FoldError {
    /// Another process holds a lock on a file the fold must rewrite.
    #[error("file {path:?} is locked by another process")]
    Locked {
        /// The contended file.
        path: PathBuf,
    },

    /// A file the fold must rewrite is not writable.
    #[error("file {path:?} is not writable")]
    ReadOnly {
        /// The read-only file.
        path: PathBuf,
    },

    /// A file's content cannot be folded.
    #[error("cannot fold {path:?}{}", diagnostic_suffix(.diagnostic.as_deref()))]
    Format {
        /// The offending file.
        path: PathBuf,
        /// Why the content was rejected.
        #[source]
        source: DocumentError,
        /// External validator findings, when a validator had something to
        /// say about the file.
        diagnostic: Option<String>,
    },

    /// A rename in the backup-then-swap commit failed. The base was rolled
    /// back and left exactly as it was.
    #[error("failed to commit folded base, renaming {path:?}")]
    Commit {
        /// The path whose rename failed.
        path: PathBuf,
        /// The rename error.
        #[source]
        source: io::Error,
    },

    /// The install failed and the rollback failed too. The pre-fold content
    /// survives in the backup file; the folded content stays in the last
    /// temporary.
    #[error("rollback failed after a failed install: {install}; rollback: {rollback}")]
    RollbackFailed {
        /// What broke the install.
        install: io::Error,
        /// What broke the rollback.
        rollback: io::Error,
    },

    /// Everything else the filesystem can do.
    #[error(transparent)]
    Io(#[from] io::Error),
}

fn diagnostic_suffix(diagnostic: Option<&str>) -> String {
    diagnostic.map_or_else(String::new, |d| format!("; validator: {d}"))
}

// ---------------------------------------------------------------------------
// Options and report
// ---------------------------------------------------------------------------

/// Tunables for [`fold_updates`].
#[derive(Clone, Debug)]
pub struct FoldOptions {
    id_attribute: String,
    update_suffix: String,
}

impl FoldOptions {
    /// Options with the built-in identifier attribute and update suffix.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id_attribute: DEFAULT_ID_ATTRIBUTE.to_owned(),
            update_suffix: DEFAULT_UPDATE_SUFFIX.to_owned(),
        }
    }

    /// Replace the identifier attribute records are paired by.
    #[must_use]
    pub fn with_id_attribute(mut self, attribute: &str) -> Self {
        self.id_attribute = attribute.to_owned();
        self
    }

    /// Replace the update-file suffix token.
    #[must_use]
    pub fn with_update_suffix(mut self, suffix: &str) -> Self {
        self.update_suffix = suffix.to_owned();
        self
    }

    /// The identifier attribute records are paired by.
    #[must_use]
    pub fn id_attribute(&self) -> &str {
        &self.id_attribute
    }

    /// The update-file suffix token.
    #[must_use]
    pub fn update_suffix(&self) -> &str {
        &self.update_suffix
    }
}

impl Default for FoldOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// What a successful fold run did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FoldReport {
    /// Update files folded into the base.
    pub folded: usize,
    /// Empty or whitespace-only update files discarded without folding.
    pub discarded: usize,
    /// Where the pre-fold base content went, when a commit happened.
    pub backup: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// The pipeline
// ---------------------------------------------------------------------------

struct FoldTally {
    folded: usize,
    discarded: usize,
}

/// Fold every pending update file into `base`.
///
/// Returns `Ok(None)` when no update files exist. On success all update
/// files and intermediate temporaries are gone and the pre-fold base sits
/// at the reported backup path.
///
/// # Errors
///
/// [`FoldError::Locked`] and [`FoldError::ReadOnly`] from the preflight
/// probe, [`FoldError::Format`] for content that cannot be folded, commit
/// and I/O failures. Handled failures leave the base untouched and remove
/// the temporaries.
pub fn fold_updates(
    base: &Path,
    options: &FoldOptions,
    validator: &dyn DocumentValidator,
) -> Result<Option<FoldReport>, FoldError> {
    let updates = update::enumerate_updates(base, options.update_suffix())?;
    if updates.is_empty() {
        return Ok(None);
    }
    tracing::info!(
        base = %base.display(),
        updates = updates.len(),
        "folding update files"
    );
    preflight(base, &updates)?;

    let mut temporaries = Vec::new();
    let tally = match fold_pass(base, &updates, options, validator, &mut temporaries) {
        Ok(tally) => tally,
        Err(err) => {
            cleanup_temporaries(&temporaries);
            return Err(err);
        }
    };

    let mut backup = None;
    if let Some(final_tmp) = temporaries.pop() {
        match commit::install(base, &final_tmp) {
            Ok(path) => backup = Some(path),
            Err(err) => {
                if matches!(err, FoldError::RollbackFailed { .. }) {
                    tracing::warn!(
                        tmp = %final_tmp.display(),
                        "leaving folded content in place after double fault"
                    );
                } else {
                    temporaries.push(final_tmp);
                }
                cleanup_temporaries(&temporaries);
                return Err(err);
            }
        }
    }
    cleanup_temporaries(&temporaries);

    for update in &updates {
        if let Err(err) = fs::remove_file(&update.path) {
            tracing::warn!(
                update = %update.path.display(),
                error = %err,
                "failed to remove consumed update file"
            );
        }
    }
    tracing::info!(
        folded = tally.folded,
        discarded = tally.discarded,
        "fold complete"
    );
    Ok(Some(FoldReport {
        folded: tally.folded,
        discarded: tally.discarded,
        backup,
    }))
}

/// Read the base, fold each update in order, and leave every intermediate
/// result in a fresh temporary. The last temporary is the commit candidate.
fn fold_pass(
    base: &Path,
    updates: &[UpdateFile],
    options: &FoldOptions,
    validator: &dyn DocumentValidator,
    temporaries: &mut Vec<PathBuf>,
) -> Result<FoldTally, FoldError> {
    let text = fs::read_to_string(base)?;
    let mut current = parse_document(&text)
        .map_err(|source| DocumentError::Parse {
            side: DocumentSide::Local,
            source,
        })
        .and_then(|tree| records_by_id(&tree, options.id_attribute()).map(|_| tree))
        .map_err(|source| FoldError::Format {
            path: base.to_path_buf(),
            source,
            diagnostic: validator.validate(base),
        })?;

    let mut folded = 0;
    let mut discarded = 0;
    for update in updates {
        let incoming = fs::read_to_string(&update.path)?;
        if incoming.trim().is_empty() {
            tracing::warn!(update = %update.path.display(), "discarding empty update file");
            discarded += 1;
            continue;
        }
        tracing::info!(update = %update.path.display(), "folding update file");
        let next =
            fold_into(&current, &incoming, options.id_attribute()).map_err(|source| {
                FoldError::Format {
                    path: update.path.clone(),
                    source,
                    diagnostic: validator.validate(&update.path),
                }
            })?;
        let tmp = temp_path(base);
        fs::write(&tmp, write_document(&next))?;
        temporaries.push(tmp);
        current = next;
        folded += 1;
    }
    Ok(FoldTally { folded, discarded })
}

/// Replace `older`'s records with same-identity records from `newer` and
/// append the records only `newer` has, in its order. The root shell and
/// non-record content ride along from `older`.
fn fold_into(older: &Tree, newer: &str, id_attribute: &str) -> Result<Tree, DocumentError> {
    let newer_tree = parse_document(newer).map_err(|source| DocumentError::Parse {
        side: DocumentSide::Incoming,
        source,
    })?;
    let older_tag = older.tag(older.root()).unwrap_or_default();
    let newer_tag = newer_tree.tag(newer_tree.root()).unwrap_or_default();
    if older_tag != newer_tag {
        return Err(MergeError::RootMismatch {
            ours: older_tag.to_owned(),
            theirs: newer_tag.to_owned(),
        }
        .into());
    }
    let older_records = records_by_id(older, id_attribute)?;
    let newer_records = records_by_id(&newer_tree, id_attribute)?;
    let older_ids: HashMap<NodeId, &RecordId> =
        older_records.iter().map(|(id, node)| (*node, id)).collect();
    let newer_index: HashMap<&RecordId, NodeId> = newer_records
        .iter()
        .map(|(id, node)| (id, *node))
        .collect();

    let mut out = Tree::new(older_tag);
    if let Some(attributes) = older.attributes(older.root()) {
        for (name, value) in attributes {
            out.set_attribute(out.root(), name, value);
        }
    }
    let out_root = out.root();

    let mut replaced: HashSet<RecordId> = HashSet::new();
    for &child in older.children(older.root()) {
        if !older.is_element(child) {
            let copy = out.adopt(older, child);
            out.append_child(out_root, copy);
            continue;
        }
        let Some(&id) = older_ids.get(&child) else {
            continue;
        };
        if let Some(&newer_node) = newer_index.get(id) {
            replaced.insert(id.clone());
            let copy = out.adopt(&newer_tree, newer_node);
            out.append_child(out_root, copy);
        } else {
            let copy = out.adopt(older, child);
            out.append_child(out_root, copy);
        }
    }
    for (id, newer_node) in &newer_records {
        if replaced.contains(id) {
            continue;
        }
        let copy = out.adopt(&newer_tree, *newer_node);
        out.append_child(out_root, copy);
    }
    Ok(out)
}

/// Every file the fold will rewrite must be openable for writing and not
/// locked elsewhere. Probes run before anything is modified and never
/// retry.
fn preflight(base: &Path, updates: &[UpdateFile]) -> Result<(), FoldError> {
    probe_file(base)?;
    for update in updates {
        probe_file(&update.path)?;
    }
    Ok(())
}

fn probe_file(path: &Path) -> Result<(), FoldError> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|err| match err.kind() {
            io::ErrorKind::PermissionDenied => FoldError::ReadOnly {
                path: path.to_path_buf(),
            },
            _ => FoldError::Io(err),
        })?;
    // The probe lock is released when `file` drops.
    match file.try_lock_exclusive() {
        Ok(()) => Ok(()),
        Err(err) if err.raw_os_error() == fs4::lock_contended_error().raw_os_error() => {
            Err(FoldError::Locked {
                path: path.to_path_buf(),
            })
        }
        Err(err) => Err(FoldError::Io(err)),
    }
}

/// Sibling temporary name that will not collide across runs.
fn temp_path(base: &Path) -> PathBuf {
    let name = base
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let nonce: u32 = rand::random();
    base.with_file_name(format!("{name}.tmp-{nonce:08x}"))
}

fn cleanup_temporaries(temporaries: &[PathBuf]) {
    for tmp in temporaries {
        if let Err(err) = fs::remove_file(tmp) {
            tracing::warn!(
                tmp = %tmp.display(),
                error = %err,
                "failed to remove fold temporary"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
