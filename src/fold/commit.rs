//! Backup-then-swap installation of a folded base file.
//!
//! After [`install`] returns, the base file is either fully the new content
//! or exactly what it was. `.bak` always holds the immediate pre-fold
//! content; an older `.bak` shifts to the first free `.bakN` slot first.

use std::fs;
use std::path::{Path, PathBuf};

use super::FoldError;

/// Swap `tmp` into place as the new base, backing up the current base.
///
/// Returns the path now holding the pre-fold content. A failed install
/// rolls the backup back before propagating; a failure during that
/// rollback propagates both errors.
pub(crate) fn install(base: &Path, tmp: &Path) -> Result<PathBuf, FoldError> {
    let backup = numbered_backup(base, 0);
    if backup.exists() {
        let spill = first_free_backup(base);
        fs::rename(&backup, &spill).map_err(|source| FoldError::Commit {
            path: backup.clone(),
            source,
        })?;
        tracing::debug!(from = %backup.display(), to = %spill.display(), "shifted previous backup");
    }
    fs::rename(base, &backup).map_err(|source| FoldError::Commit {
        path: base.to_path_buf(),
        source,
    })?;

    let installed = crate::fp!("FP_FOLD_INSTALL_BASE").and_then(|()| fs::rename(tmp, base));
    if let Err(install) = installed {
        tracing::warn!(base = %base.display(), error = %install, "install failed, rolling back");
        return match fs::rename(&backup, base) {
            Ok(()) => Err(FoldError::Commit {
                path: base.to_path_buf(),
                source: install,
            }),
            Err(rollback) => Err(FoldError::RollbackFailed { install, rollback }),
        };
    }
    tracing::info!(backup = %backup.display(), "installed folded base");
    Ok(backup)
}

/// `<base>.bak` for index 0, `<base>.bakN` otherwise.
fn numbered_backup(base: &Path, index: usize) -> PathBuf {
    let name = base
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if index == 0 {
        base.with_file_name(format!("{name}.bak"))
    } else {
        base.with_file_name(format!("{name}.bak{index}"))
    }
}

/// First `.bakN` slot not already taken, counting from 1.
fn first_free_backup(base: &Path) -> PathBuf {
    let mut index = 1;
    loop {
        let candidate = numbered_backup(base, index);
        if !candidate.exists() {
            return candidate;
        }
        index += 1;
    }
}
