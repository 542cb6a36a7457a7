//! Arena-backed content tree.

use std::path::PathBuf;

use super::ProjectError;

/// Index of a node in a [`ContentTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
  pub fn index(self) -> usize {
    self.0
  }
}

/// A buildable content file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileItem {
  pub input: PathBuf,
  /// `None` when the file produces no standalone output.
  pub output: Option<PathBuf>,
  /// Converter argument template with `{input}` and `{output}` placeholders.
  pub arguments: String,
  pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
  Project,
  Folder,
  File(FileItem),
}

#[derive(Debug, Clone)]
pub struct ContentNode {
  pub name: String,
  /// Project-relative `/`-separated path. Empty for the project node.
  pub key: String,
  pub kind: NodeKind,
  pub parent: Option<NodeId>,
  pub children: Vec<NodeId>,
}

impl ContentNode {
  pub fn is_container(&self) -> bool {
    matches!(self.kind, NodeKind::Project | NodeKind::Folder)
  }

  pub fn file(&self) -> Option<&FileItem> {
    match &self.kind {
      NodeKind::File(item) => Some(item),
      _ => None,
    }
  }
}

/// Project, folders and files. The project node is always [`ContentTree::root`].
#[derive(Debug, Clone)]
pub struct ContentTree {
  nodes: Vec<ContentNode>,
}

impl ContentTree {
  pub fn new(project_name: impl Into<String>) -> Self {
    Self {
      nodes: vec![ContentNode {
        name: project_name.into(),
        key: String::new(),
        kind: NodeKind::Project,
        parent: None,
        children: Vec::new(),
      }],
    }
  }

  pub fn root(&self) -> NodeId {
    NodeId(0)
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  pub fn node(&self, id: NodeId) -> &ContentNode {
    &self.nodes[id.0]
  }

  pub fn parent(&self, id: NodeId) -> Option<NodeId> {
    self.nodes[id.0].parent
  }

  pub fn children(&self, id: NodeId) -> &[NodeId] {
    &self.nodes[id.0].children
  }

  pub fn add_folder(&mut self, parent: NodeId, name: &str) -> Result<NodeId, ProjectError> {
    self.add(parent, name, NodeKind::Folder)
  }

  pub fn add_file(&mut self, parent: NodeId, name: &str, item: FileItem) -> Result<NodeId, ProjectError> {
    self.add(parent, name, NodeKind::File(item))
  }

  /// Find a node by key. The empty key is the project itself.
  pub fn find(&self, key: &str) -> Option<NodeId> {
    let mut current = self.root();
    for segment in key.split('/').filter(|s| !s.is_empty()) {
      current = *self
        .children(current)
        .iter()
        .find(|&&child| self.nodes[child.0].name == segment)?;
    }
    Some(current)
  }

  /// Files at or below `id`, depth-first with children in order.
  pub fn files_under(&self, id: NodeId) -> Vec<NodeId> {
    let mut files = Vec::new();
    let mut stack = vec![id];
    while let Some(current) = stack.pop() {
      let node = &self.nodes[current.0];
      if node.file().is_some() {
        files.push(current);
      }
      stack.extend(node.children.iter().rev());
    }
    files
  }

  /// Every file in the project.
  pub fn files(&self) -> impl Iterator<Item = (&str, &FileItem)> {
    self
      .nodes
      .iter()
      .filter_map(|node| node.file().map(|item| (node.key.as_str(), item)))
  }

  fn add(&mut self, parent: NodeId, name: &str, kind: NodeKind) -> Result<NodeId, ProjectError> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
      return Err(ProjectError::InvalidName(name.to_string()));
    }

    let parent_node = &self.nodes[parent.0];
    if !parent_node.is_container() {
      return Err(ProjectError::NotAContainer(parent_node.key.clone()));
    }

    let key = if parent_node.key.is_empty() {
      name.to_string()
    } else {
      format!("{}/{}", parent_node.key, name)
    };
    if parent_node.children.iter().any(|&c| self.nodes[c.0].name == name) {
      return Err(ProjectError::DuplicateItem(key));
    }

    let id = NodeId(self.nodes.len());
    self.nodes.push(ContentNode {
      name: name.to_string(),
      key,
      kind,
      parent: Some(parent),
      children: Vec::new(),
    });
    self.nodes[parent.0].children.push(id);
    Ok(id)
  }
}
