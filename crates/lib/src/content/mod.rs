//! Content hierarchy of a project.
//!
//! A project is a tree of folders and files. Nodes live in a flat arena and
//! point at their parent by index, so walking up the tree never needs a
//! reference cycle.

mod project;
mod tree;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use project::{ContentProject, ItemDescription, ProjectDescription};
pub use tree::{ContentNode, ContentTree, FileItem, NodeId, NodeKind};

/// Errors raised while loading or querying a project.
#[derive(Debug, Error)]
pub enum ProjectError {
  #[error("failed to read project {}: {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse project {}: {source}", path.display())]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("invalid item name: {0:?}")]
  InvalidName(String),

  #[error("duplicate item: {0}")]
  DuplicateItem(String),

  /// Children can only be added to the project or a folder.
  #[error("not a folder: {0}")]
  NotAContainer(String),

  #[error("no such item: {0}")]
  UnknownItem(String),
}

/// Normalize a user-supplied item path to a key: `/` separators, no leading `./` or `/`.
pub fn normalize_key(raw: &str) -> String {
  raw
    .replace('\\', "/")
    .split('/')
    .filter(|segment| !segment.is_empty() && *segment != ".")
    .collect::<Vec<_>>()
    .join("/")
}
