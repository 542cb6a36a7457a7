//! External converter resolution and invocation.
//!
//! # Submodules
//!
//! - [`locate`] - Ordered search for the converter executable
//! - [`override_file`] - Process-wide state of the user-corrected converter path
//! - [`invoke`] - Launching the converter, with one interactive recovery attempt
//! - [`recovery`] - Rendezvous channel between build workers and the UI thread
//! - [`args`] - Turning the opaque argument string into a process command line

pub mod args;
pub mod invoke;
pub mod locate;
pub mod override_file;
pub mod recovery;

use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::{DEFAULT_TOOL_ENV_VAR, DEFAULT_TOOL_NAME};

pub use invoke::{ToolInvoker, ToolOutput};
pub use locate::{ToolLocator, ToolResolution, ToolSource};
pub use override_file::OverrideFile;
pub use recovery::{RecoveryClient, RecoveryRequest, RecoveryResponse, RecoveryServer};

/// Errors raised while locating or running the converter.
#[derive(Debug, Error)]
pub enum ToolError {
  /// The executable could not be found, after recovery was declined or exhausted.
  #[error("could not find {tool} at location: '{}'", path.display())]
  ToolNotFound { tool: String, path: PathBuf },

  /// The OS refused to start the process for a reason other than a missing executable.
  #[error("failed to launch {}: {source}", path.display())]
  ProcessLaunch {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  /// The converter ran and reported failure.
  #[error("{tool} failed with exit code {code:?}: {stderr}")]
  ConversionFailed {
    tool: String,
    code: Option<i32>,
    stderr: String,
  },

  /// Waiting on a running converter failed.
  #[error("failed to wait for {tool}: {source}")]
  Wait {
    tool: String,
    #[source]
    source: io::Error,
  },

  /// The corrected converter path could not be written.
  #[error("failed to write override file {}: {source}", path.display())]
  OverrideWrite {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Which converter to look for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSpec {
  /// Bare executable name without platform suffix.
  pub name: String,

  /// Environment variable holding an explicit path, consulted on Windows only.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub env_var: Option<String>,
}

impl ToolSpec {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      env_var: None,
    }
  }

  pub fn with_env_var(mut self, env_var: impl Into<String>) -> Self {
    self.env_var = Some(env_var.into());
    self
  }
}

impl Default for ToolSpec {
  fn default() -> Self {
    Self::new(DEFAULT_TOOL_NAME).with_env_var(DEFAULT_TOOL_ENV_VAR)
  }
}
