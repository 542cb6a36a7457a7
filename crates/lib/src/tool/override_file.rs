//! Persisted converter path corrections.
//!
//! An override file is a one-line text file named `.<tool>` holding the path of
//! the converter executable. It is written when the user picks a replacement
//! during recovery and read by the locator on the next resolution.
//!
//! Reads are cached process-wide per file: the first [`OverrideFile::load`]
//! hits the disk, later ones reuse the value until [`OverrideFile::save`] or
//! [`OverrideFile::reload`] replaces it.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::ToolError;

static LOADED: LazyLock<Mutex<HashMap<PathBuf, Option<PathBuf>>>> = LazyLock::new(|| Mutex::new(HashMap::new()));

/// One override file location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideFile {
  path: PathBuf,
}

impl OverrideFile {
  /// File name of the override file for `tool` (e.g. `.ffmpeg`).
  pub fn file_name(tool: &str) -> String {
    format!(".{}", tool)
  }

  /// The override file for `tool` inside `dir`.
  pub fn in_dir(dir: &Path, tool: &str) -> Self {
    Self {
      path: dir.join(Self::file_name(tool)),
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// The overriding converter path, or `None` when absent or unreadable.
  ///
  /// Relative paths are resolved against the directory holding the override file.
  pub fn load(&self) -> Option<PathBuf> {
    let mut loaded = LOADED.lock();
    if let Some(value) = loaded.get(&self.path) {
      return value.clone();
    }
    let value = self.read_from_disk();
    loaded.insert(self.path.clone(), value.clone());
    value
  }

  /// Drop the cached value and read the file again.
  pub fn reload(&self) -> Option<PathBuf> {
    LOADED.lock().remove(&self.path);
    self.load()
  }

  /// Persist `exe` as the override and make it visible to later loads.
  pub fn save(&self, exe: &Path) -> Result<(), ToolError> {
    fs::write(&self.path, format!("{}\n", exe.display())).map_err(|source| ToolError::OverrideWrite {
      path: self.path.clone(),
      source,
    })?;
    LOADED.lock().insert(self.path.clone(), Some(exe.to_path_buf()));
    debug!(file = ?self.path, exe = ?exe, "saved converter override");
    Ok(())
  }

  fn read_from_disk(&self) -> Option<PathBuf> {
    let content = match fs::read_to_string(&self.path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
      Err(e) => {
        warn!(file = ?self.path, error = %e, "could not read override file");
        return None;
      }
    };

    let line = content.lines().next().map(str::trim).unwrap_or_default();
    if line.is_empty() {
      warn!(file = ?self.path, "override file is empty");
      return None;
    }

    let exe = PathBuf::from(line);
    if exe.is_absolute() {
      return Some(exe);
    }
    let base = self.path.parent().unwrap_or(Path::new("."));
    Some(base.join(exe))
  }
}
