//! Shared helpers for lexmerge integration tests.
//!
//! All tests work against temp directories — no side effects outside them.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use filetime::FileTime;
use tempfile::TempDir;

/// Fresh scratch directory for one test.
pub fn scratch() -> TempDir {
    TempDir::new().expect("failed to create temp dir")
}

/// Write a file under `dir`, returning its path.
pub fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).expect("failed to write fixture");
    path
}

/// Read a file back as UTF-8.
pub fn read_file(path: &Path) -> String {
    fs::read_to_string(path).unwrap_or_else(|e| panic!("read {}: {e}", path.display()))
}

/// Pin a file's modification time (seconds since the epoch). Update files
/// fold in mtime order, so tests set these explicitly.
pub fn set_mtime(path: &Path, secs: i64) {
    filetime::set_file_mtime(path, FileTime::from_unix_time(secs, 0))
        .expect("failed to set mtime");
}

/// Names of the entries directly under `dir`, sorted.
pub fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .expect("read_dir failed")
        .map(|e| e.expect("dir entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
