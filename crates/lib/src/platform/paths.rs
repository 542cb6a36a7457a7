use std::path::PathBuf;

use super::Os;

/// Directory containing the running program.
///
/// Falls back to the working directory when the executable path cannot be determined.
pub fn program_dir() -> PathBuf {
  std::env::current_exe()
    .ok()
    .and_then(|exe| exe.parent().map(PathBuf::from))
    .map(|dir| dunce::canonicalize(&dir).unwrap_or(dir))
    .unwrap_or_else(working_dir)
}

/// The process working directory, or `.` if it cannot be read.
pub fn working_dir() -> PathBuf {
  std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// Well-known directories a converter is commonly installed into.
pub fn install_dirs(os: Os) -> Vec<PathBuf> {
  match os {
    Os::Linux => vec![PathBuf::from("/usr/bin")],
    Os::MacOs => vec![PathBuf::from("/Applications")],
    Os::Windows => Vec::new(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn install_dirs_per_platform() {
    assert_eq!(install_dirs(Os::Linux), vec![PathBuf::from("/usr/bin")]);
    assert_eq!(install_dirs(Os::MacOs), vec![PathBuf::from("/Applications")]);
    assert!(install_dirs(Os::Windows).is_empty());
  }

  #[test]
  fn program_dir_is_a_directory() {
    assert!(program_dir().is_dir());
  }
}
