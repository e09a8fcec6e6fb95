//! Update-file enumeration and ordering.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::FoldError;

/// An update file waiting to be folded, snapshotted at enumeration time.
#[derive(Clone, Debug)]
pub struct UpdateFile {
    /// Sibling of the base file, as matched by the glob.
    pub path: PathBuf,
    /// Last-write time at enumeration.
    pub modified: SystemTime,
}

/// All `<base name>.<suffix>-*` siblings of `base`, oldest first.
///
/// Ties on the write time break by file name, so runs stay reproducible on
/// filesystems with coarse timestamps.
pub(crate) fn enumerate_updates(
    base: &Path,
    suffix: &str,
) -> Result<Vec<UpdateFile>, FoldError> {
    let pattern = format!(
        "{}.{}-*",
        glob::Pattern::escape(&base.to_string_lossy()),
        glob::Pattern::escape(suffix)
    );
    let mut updates = Vec::new();
    for entry in glob::glob(&pattern).map_err(io::Error::other)? {
        let path = entry.map_err(glob::GlobError::into_error)?;
        if !path.is_file() {
            continue;
        }
        let modified = fs::metadata(&path)?.modified()?;
        updates.push(UpdateFile { path, modified });
    }
    updates.sort_by(|a, b| {
        a.modified
            .cmp(&b.modified)
            .then_with(|| a.path.cmp(&b.path))
    });
    Ok(updates)
}
