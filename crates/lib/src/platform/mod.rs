//! Platform detection and well-known locations.

pub mod os;
pub mod paths;

pub use os::Os;

/// Returns the current operating system, defaulting to Linux conventions on
/// unrecognised Unix-likes.
pub fn current_os() -> Os {
  Os::current().unwrap_or(Os::Linux)
}
