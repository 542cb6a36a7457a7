//! Test utilities for contentpipe-lib.
//!
//! Helpers for writing fixture files, pinning modification times and creating
//! small executables that stand in for the real converter.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Write `content` to `path`, creating parent directories.
pub fn write_file(path: &Path, content: &str) {
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).unwrap();
  }
  fs::write(path, content).unwrap();
}

/// Set the last-write time of an existing file.
pub fn set_mtime(path: &Path, time: SystemTime) {
  let file = fs::OpenOptions::new().write(true).open(path).unwrap();
  file.set_modified(time).unwrap();
}

/// Create an executable shell script at `dir/name` running `body`.
///
/// The script receives the converter arguments as `$1`, `$2`, ...
#[cfg(unix)]
pub fn fake_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
  use std::os::unix::fs::PermissionsExt;

  let path = dir.join(name);
  write_file(&path, &format!("#!/bin/sh\n{}\n", body));
  let mut perms = fs::metadata(&path).unwrap().permissions();
  perms.set_mode(0o755);
  fs::set_permissions(&path, perms).unwrap();
  path
}

/// An empty placeholder file standing in for an executable during locator tests.
pub fn placeholder_exe(dir: &Path, name: &str) -> PathBuf {
  let path = dir.join(name);
  write_file(&path, "");
  path
}
