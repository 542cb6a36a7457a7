//! Converter executable resolution.
//!
//! Candidates are tried in a fixed order and the first one that exists as a
//! file wins:
//!
//! 1. Override file in the working directory
//! 2. Override file beside the running program
//! 3. `<tool>` (`<tool>.exe` on Windows) beside the running program
//! 4. Well-known install directories (`/usr/bin` on Linux, `/Applications` on macOS)
//! 5. The tool's environment variable (Windows only)
//! 6. The bare tool name, left to the OS search path at launch
//!
//! Overrides come first so a user correction survives across runs.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, warn};

use crate::platform::{Os, current_os, paths};

use super::{OverrideFile, ToolSpec};

/// Where a resolved converter path came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolSource {
  WorkingDirOverride,
  ProgramDirOverride,
  ProgramDir,
  InstallDir,
  Environment,
  SearchPath,
}

impl fmt::Display for ToolSource {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Self::WorkingDirOverride => "override file (working directory)",
      Self::ProgramDirOverride => "override file (program directory)",
      Self::ProgramDir => "program directory",
      Self::InstallDir => "install directory",
      Self::Environment => "environment variable",
      Self::SearchPath => "search path",
    };
    f.write_str(s)
  }
}

/// A resolved converter path and the candidate that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolResolution {
  pub path: PathBuf,
  pub source: ToolSource,
}

/// Resolves the converter executable for one [`ToolSpec`].
#[derive(Debug, Clone)]
pub struct ToolLocator {
  spec: ToolSpec,
  os: Os,
  working_dir: PathBuf,
  program_dir: PathBuf,
  install_dirs: Vec<PathBuf>,
}

impl ToolLocator {
  /// A locator using the current process's platform and directories.
  pub fn new(spec: ToolSpec) -> Self {
    let os = current_os();
    Self {
      spec,
      os,
      working_dir: paths::working_dir(),
      program_dir: paths::program_dir(),
      install_dirs: paths::install_dirs(os),
    }
  }

  /// Use the conventions of `os` (executable suffix, install dirs, environment).
  pub fn with_os(mut self, os: Os) -> Self {
    self.os = os;
    self.install_dirs = paths::install_dirs(os);
    self
  }

  pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.working_dir = dir.into();
    self
  }

  pub fn with_program_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.program_dir = dir.into();
    self
  }

  pub fn with_install_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
    self.install_dirs = dirs;
    self
  }

  pub fn spec(&self) -> &ToolSpec {
    &self.spec
  }

  /// Platform-specific bare executable name.
  pub fn exe_name(&self) -> String {
    self.os.exe_name(&self.spec.name)
  }

  /// The override file corrections are written to.
  pub fn override_file(&self) -> OverrideFile {
    OverrideFile::in_dir(&self.working_dir, &self.spec.name)
  }

  /// Resolve the converter path. Never fails: the bare name is the last resort.
  pub fn resolve(&self) -> ToolResolution {
    let resolution = self.find().unwrap_or_else(|| ToolResolution {
      path: PathBuf::from(self.exe_name()),
      source: ToolSource::SearchPath,
    });
    debug!(
      tool = %self.spec.name,
      path = ?resolution.path,
      source = %resolution.source,
      "resolved converter"
    );
    resolution
  }

  fn find(&self) -> Option<ToolResolution> {
    let found = |path: PathBuf, source: ToolSource| Some(ToolResolution { path, source });

    if let Some(path) = self.from_override(&self.override_file()) {
      return found(path, ToolSource::WorkingDirOverride);
    }

    let program_override = OverrideFile::in_dir(&self.program_dir, &self.spec.name);
    if let Some(path) = self.from_override(&program_override) {
      return found(path, ToolSource::ProgramDirOverride);
    }

    let beside_program = self.program_dir.join(self.exe_name());
    if beside_program.is_file() {
      return found(beside_program, ToolSource::ProgramDir);
    }

    for dir in &self.install_dirs {
      let candidate = dir.join(self.exe_name());
      if candidate.is_file() {
        return found(candidate, ToolSource::InstallDir);
      }
    }

    if self.os == Os::Windows
      && let Some(var) = &self.spec.env_var
      && let Some(value) = std::env::var_os(var)
    {
      let candidate = PathBuf::from(value);
      if candidate.is_file() {
        return found(candidate, ToolSource::Environment);
      }
    }

    None
  }

  fn from_override(&self, file: &OverrideFile) -> Option<PathBuf> {
    let path = file.load()?;
    if path.is_file() {
      return Some(path);
    }
    warn!(file = ?file.path(), path = ?path, "invalid converter path in override file");
    None
  }
}
