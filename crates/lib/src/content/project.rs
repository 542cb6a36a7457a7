//! Project description loading.
//!
//! A project is described by a `content.json` next to its content files:
//!
//! ```json
//! {
//!   "name": "Content",
//!   "outputDir": "bin",
//!   "configuration": "Release",
//!   "references": ["plugins/shaders.so"],
//!   "tool": { "name": "ffmpeg", "envVar": "FFMPEG" },
//!   "contents": [
//!     { "type": "folder", "name": "audio", "contents": [
//!       { "type": "file", "name": "theme.wav", "output": "theme.ogg",
//!         "dependencies": ["audio/intro.wav"] }
//!     ] }
//!   ]
//! }
//! ```
//!
//! Inputs resolve against the project directory, outputs against `outputDir`
//! (itself relative to the project directory unless absolute).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::consts::{DEFAULT_ARGUMENTS, PROJECT_FILENAME};
use crate::record::{BuildRecord, RecordError, RecordStore};
use crate::tool::ToolSpec;

use super::{ContentTree, FileItem, NodeId, ProjectError, normalize_key};

fn default_output_dir() -> PathBuf {
  PathBuf::from("bin")
}

/// On-disk form of a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDescription {
  #[serde(default)]
  pub name: String,

  #[serde(default = "default_output_dir")]
  pub output_dir: PathBuf,

  /// Substituted for `{configuration}` in argument templates.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub configuration: Option<String>,

  /// Extra files the converter relies on, relative to the project directory.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub references: Vec<String>,

  #[serde(default)]
  pub tool: Option<ToolSpec>,

  /// Argument template for files that do not set their own.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub arguments: Option<String>,

  #[serde(default)]
  pub contents: Vec<ItemDescription>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ItemDescription {
  Folder {
    name: String,
    #[serde(default)]
    contents: Vec<ItemDescription>,
  },
  File {
    name: String,
    /// Output file name inside the mirrored folder. Absent or empty means no output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    arguments: Option<String>,
    #[serde(default)]
    dependencies: Vec<String>,
  },
}

/// A loaded project: its tree plus where things live on disk.
#[derive(Debug, Clone)]
pub struct ContentProject {
  pub name: String,
  pub dir: PathBuf,
  pub output_dir: PathBuf,
  pub configuration: Option<String>,
  /// Resolved against the project directory.
  pub references: Vec<PathBuf>,
  pub tool: ToolSpec,
  pub tree: ContentTree,
}

impl ContentProject {
  /// Load a project from a description file, or from `content.json` inside a directory.
  pub fn load(path: &Path) -> Result<Self, ProjectError> {
    let file = if path.is_dir() {
      path.join(PROJECT_FILENAME)
    } else {
      path.to_path_buf()
    };

    let content = fs::read_to_string(&file).map_err(|source| ProjectError::Read {
      path: file.clone(),
      source,
    })?;
    let description: ProjectDescription = serde_json::from_str(&content).map_err(|source| ProjectError::Parse {
      path: file.clone(),
      source,
    })?;

    let dir = file
      .parent()
      .map(Path::to_path_buf)
      .filter(|p| !p.as_os_str().is_empty())
      .unwrap_or_else(|| PathBuf::from("."));
    let dir = dunce::canonicalize(&dir).unwrap_or(dir);

    let project = Self::from_description(dir, description)?;
    info!(
      project = %project.name,
      dir = ?project.dir,
      files = project.tree.files().count(),
      "loaded project"
    );
    Ok(project)
  }

  /// Build a project rooted at `dir` from an already parsed description.
  pub fn from_description(dir: PathBuf, description: ProjectDescription) -> Result<Self, ProjectError> {
    let name = if description.name.is_empty() {
      dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Content".to_string())
    } else {
      description.name
    };

    let output_dir = if description.output_dir.is_absolute() {
      description.output_dir
    } else {
      dir.join(description.output_dir)
    };
    let default_arguments = description
      .arguments
      .unwrap_or_else(|| DEFAULT_ARGUMENTS.to_string());
    let references = description.references.iter().map(|r| dir.join(r)).collect();

    let mut project = Self {
      tree: ContentTree::new(&name),
      name,
      dir,
      output_dir,
      configuration: description.configuration.filter(|c| !c.is_empty()),
      references,
      tool: description.tool.unwrap_or_default(),
    };
    let root = project.tree.root();
    project.add_items(root, &description.contents, &default_arguments)?;
    Ok(project)
  }

  fn add_items(
    &mut self,
    parent: NodeId,
    items: &[ItemDescription],
    default_arguments: &str,
  ) -> Result<(), ProjectError> {
    for item in items {
      match item {
        ItemDescription::Folder { name, contents } => {
          let folder = self.tree.add_folder(parent, name)?;
          self.add_items(folder, contents, default_arguments)?;
        }
        ItemDescription::File {
          name,
          output,
          arguments,
          dependencies,
        } => {
          let folder_key = self.tree.node(parent).key.clone();
          let input = self.dir.join(&folder_key).join(name);
          let output = output
            .as_deref()
            .filter(|o| !o.is_empty())
            .map(|o| self.output_dir.join(&folder_key).join(o));
          let file = FileItem {
            input,
            output,
            arguments: arguments.clone().unwrap_or_else(|| default_arguments.to_string()),
            dependencies: dependencies.iter().map(|d| normalize_key(d)).collect(),
          };
          self.tree.add_file(parent, name, file)?;
        }
      }
    }
    Ok(())
  }

  /// Resolve an item selector to a node. `None` selects the whole project.
  pub fn resolve(&self, selector: Option<&str>) -> Result<NodeId, ProjectError> {
    let key = selector.map(normalize_key).unwrap_or_default();
    self.tree.find(&key).ok_or(ProjectError::UnknownItem(key))
  }

  /// Keys of the files at or below `id`, depth-first.
  pub fn file_keys(&self, id: NodeId) -> Vec<String> {
    self
      .tree
      .files_under(id)
      .into_iter()
      .map(|file| self.tree.node(file).key.clone())
      .collect()
  }

  /// The file item tracked under `key`.
  pub fn file(&self, key: &str) -> Option<&FileItem> {
    self.tree.find(key).and_then(|id| self.tree.node(id).file())
  }

  /// Create one record per file.
  ///
  /// Cached timestamps are adopted when the cached record describes the same
  /// files. Otherwise the record snapshots the disk now; a missing source is
  /// logged and leaves the record stale.
  pub fn records(&self, cached: &BTreeMap<String, BuildRecord>) -> RecordStore {
    let mut store = RecordStore::new(&self.dir);

    for (key, item) in self.tree.files() {
      let mut record =
        BuildRecord::new(&item.input, item.output.clone()).with_dependencies(item.dependencies.iter().cloned());

      let adopted = cached
        .get(key)
        .is_some_and(|previous| record.adopt_timestamps(previous));
      if adopted {
        debug!(item = %key, "using cached timestamps");
      } else {
        match record.refresh_modified_time() {
          Ok(()) => {}
          Err(RecordError::SourceMissing(path)) => {
            warn!(item = %key, path = ?path, "source file missing");
          }
          Err(e) => {
            warn!(item = %key, error = %e, "could not read timestamps");
          }
        }
      }

      store.insert(key, record);
    }

    store
  }
}
