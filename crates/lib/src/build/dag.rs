//! Dependency graph over the items of one build pass.
//!
//! Edges run from a dependency to its dependent, so every wave only contains
//! items whose tracked dependencies sit in earlier waves. Unlike a strict
//! topological sort, a cycle does not reject the whole graph: the items that
//! can never become ready are handed back separately and everything else still
//! gets scheduled.

use std::collections::{BTreeSet, HashMap, HashSet};

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::record::RecordStore;

/// Items grouped into parallel waves.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Schedule {
  /// Each wave may run concurrently once the previous waves are done.
  pub waves: Vec<Vec<String>>,
  /// Items that are on, or depend on, a dependency cycle.
  pub blocked: Vec<String>,
}

pub struct BuildDag {
  graph: DiGraph<String, ()>,
  nodes: HashMap<String, NodeIndex>,
}

impl BuildDag {
  /// Build the graph of `keys` using the tracked dependencies in `records`.
  ///
  /// Dependencies outside `keys` are not part of the pass and add no edge.
  pub fn new(records: &RecordStore, keys: &[String]) -> Self {
    let mut graph = DiGraph::new();
    let mut nodes = HashMap::new();

    for key in keys {
      if !nodes.contains_key(key) {
        let idx = graph.add_node(key.clone());
        nodes.insert(key.clone(), idx);
      }
    }

    for key in keys {
      let dependent_idx = nodes[key];
      let deps: BTreeSet<String> = records.tracked_dependencies(key).into_iter().collect();
      for dep in deps {
        if let Some(&dep_idx) = nodes.get(&dep)
          && !graph.contains_edge(dep_idx, dependent_idx)
        {
          graph.add_edge(dep_idx, dependent_idx, ());
        }
      }
    }

    Self { graph, nodes }
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  /// Direct dependencies of `key` within this pass.
  pub fn dependencies(&self, key: &str) -> Vec<String> {
    let Some(&idx) = self.nodes.get(key) else {
      return Vec::new();
    };
    self
      .graph
      .neighbors_directed(idx, Direction::Incoming)
      .map(|dep| self.graph[dep].clone())
      .collect()
  }

  /// Group the items into waves with Kahn's algorithm.
  ///
  /// Wave contents keep the order in which items were passed to [`BuildDag::new`].
  pub fn schedule(&self) -> Schedule {
    let mut in_degree: HashMap<NodeIndex, usize> = self
      .graph
      .node_indices()
      .map(|idx| (idx, self.graph.neighbors_directed(idx, Direction::Incoming).count()))
      .collect();
    let mut remaining: HashSet<NodeIndex> = self.graph.node_indices().collect();
    let mut waves = Vec::new();

    while !remaining.is_empty() {
      let mut ready: Vec<NodeIndex> = remaining.iter().filter(|idx| in_degree[*idx] == 0).copied().collect();
      if ready.is_empty() {
        break;
      }
      ready.sort();

      for &idx in &ready {
        remaining.remove(&idx);
        for dependent in self.graph.neighbors_directed(idx, Direction::Outgoing) {
          if let Some(deg) = in_degree.get_mut(&dependent) {
            *deg = deg.saturating_sub(1);
          }
        }
      }

      waves.push(ready.into_iter().map(|idx| self.graph[idx].clone()).collect());
    }

    let mut blocked: Vec<NodeIndex> = remaining.into_iter().collect();
    blocked.sort();

    Schedule {
      waves,
      blocked: blocked.into_iter().map(|idx| self.graph[idx].clone()).collect(),
    }
  }
}
