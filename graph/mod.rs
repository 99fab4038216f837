/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Graph data structures for the thought graph.
//!
//! Core structures:
//! - `Graph`: Main graph container backed by petgraph::StableGraph
//! - `Node`: A thought, keyed by its own (trimmed) text
//! - `EdgeView`: Weighted similarity link between two thoughts
//!
//! Edges hold node keys, never node copies; the only way a key can stop
//! resolving is a full replacement through [`Graph::replace_all`], which
//! bumps [`Graph::generation`] so stale holders can tell.

use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::Directed;
use std::collections::{HashMap, HashSet};

use crate::persistence::types::{GraphSnapshot, PersistedLink, PersistedNode};

pub mod analysis;
pub mod auto_link;
pub mod similarity;

/// Stable node handle (petgraph NodeIndex)
pub type NodeKey = NodeIndex;

/// Stable edge handle (petgraph EdgeIndex)
pub type EdgeKey = EdgeIndex;

/// A thought in the graph. Its text is its identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: String,
}

/// Read-only view of an edge (built from petgraph edge references)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeView {
    pub source: NodeKey,
    pub target: NodeKey,
    pub weight: f32,
}

/// Errors from graph mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// The thought was empty after trimming.
    EmptyThought,
    /// A thought with the same normalized text already exists.
    Duplicate { existing: String },
}

impl std::fmt::Display for GraphError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraphError::EmptyThought => write!(f, "Thought is empty"),
            GraphError::Duplicate { existing } => write!(f, "Already exists: {existing}"),
        }
    }
}

impl std::error::Error for GraphError {}

/// Normalized form used for the uniqueness check only.
pub fn normalize_thought(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Main graph structure backed by petgraph::StableGraph
#[derive(Clone, Debug)]
pub struct Graph {
    /// Nodes and edges in insertion order. Edges are stored as an ordered
    /// pair but every query treats them as undirected.
    pub(crate) inner: StableGraph<Node, f32, Directed>,

    /// Exact id to node mapping.
    id_to_node: HashMap<String, NodeKey>,

    /// Normalized id to node mapping; enforces uniqueness.
    normalized_to_node: HashMap<String, NodeKey>,

    /// Bumped on every full replacement.
    generation: u64,
}

impl Graph {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self {
            inner: StableGraph::new(),
            id_to_node: HashMap::new(),
            normalized_to_node: HashMap::new(),
            generation: 0,
        }
    }

    /// Insert a thought. The stored id is the trimmed text with its casing
    /// kept; uniqueness is checked on the trimmed, lowercased form.
    pub fn insert_node(&mut self, text: &str) -> Result<NodeKey, GraphError> {
        let id = text.trim();
        if id.is_empty() {
            return Err(GraphError::EmptyThought);
        }
        let normalized = normalize_thought(id);
        if let Some(existing) = self
            .normalized_to_node
            .get(&normalized)
            .and_then(|key| self.inner.node_weight(*key))
        {
            return Err(GraphError::Duplicate {
                existing: existing.id.clone(),
            });
        }

        let key = self.inner.add_node(Node { id: id.to_string() });
        self.id_to_node.insert(id.to_string(), key);
        self.normalized_to_node.insert(normalized, key);
        Ok(key)
    }

    /// Add an edge between two nodes. Parallel edges are allowed.
    pub fn add_edge(&mut self, source: NodeKey, target: NodeKey, weight: f32) -> Option<EdgeKey> {
        if !self.inner.contains_node(source) || !self.inner.contains_node(target) {
            return None;
        }
        Some(self.inner.add_edge(source, target, weight))
    }

    /// Swap in a whole new node/edge set. Used by snapshot loading.
    pub fn replace_all(&mut self, replacement: Graph) {
        let generation = self.generation.wrapping_add(1);
        *self = replacement;
        self.generation = generation;
    }

    /// Get a node by key
    pub fn get_node(&self, key: NodeKey) -> Option<&Node> {
        self.inner.node_weight(key)
    }

    /// Get node key by exact id.
    pub fn key_by_id(&self, id: &str) -> Option<NodeKey> {
        self.id_to_node.get(id).copied()
    }

    /// Get node key by id, ignoring surrounding whitespace and case.
    pub fn key_by_normalized(&self, text: &str) -> Option<NodeKey> {
        self.normalized_to_node.get(&normalize_thought(text)).copied()
    }

    /// Number of edges touching `id`. A self-loop counts once.
    pub fn degree_of(&self, id: &str) -> usize {
        let Some(key) = self.key_by_id(id) else {
            return 0;
        };
        self.edges()
            .filter(|edge| edge.source == key || edge.target == key)
            .count()
    }

    /// Ids at the other end of every edge touching `id`, de-duplicated in
    /// first-seen order. Never contains `id` itself.
    pub fn neighbors_of(&self, id: &str) -> Vec<String> {
        let Some(key) = self.key_by_id(id) else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        self.edges()
            .filter_map(|edge| {
                if edge.source == key {
                    Some(edge.target)
                } else if edge.target == key {
                    Some(edge.source)
                } else {
                    None
                }
            })
            .filter(|other| *other != key && seen.insert(*other))
            .filter_map(|other| self.get_node(other).map(|node| node.id.clone()))
            .collect()
    }

    /// Iterate over all nodes as (key, node) pairs, in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = (NodeKey, &Node)> {
        self.inner
            .node_indices()
            .map(move |idx| (idx, &self.inner[idx]))
    }

    /// Iterate over all edges as EdgeView, in insertion order
    pub fn edges(&self) -> impl Iterator<Item = EdgeView> + '_ {
        self.inner.edge_references().map(|e| EdgeView {
            source: e.source(),
            target: e.target(),
            weight: *e.weight(),
        })
    }

    /// Count of nodes in the graph
    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    /// Count of edges in the graph
    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    /// Full-replacement counter, starting at 0 for a fresh graph.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Serialize the graph to a persistable snapshot
    pub fn to_snapshot(&self) -> GraphSnapshot {
        let nodes = self
            .nodes()
            .map(|(_, node)| PersistedNode {
                id: node.id.clone(),
            })
            .collect();

        let links = self
            .edges()
            .filter_map(|edge| {
                let source = self.get_node(edge.source)?;
                let target = self.get_node(edge.target)?;
                Some(PersistedLink {
                    source_id: Some(source.id.clone()),
                    target_id: Some(target.id.clone()),
                    weight: edge.weight,
                })
            })
            .collect();

        GraphSnapshot { nodes, links }
    }

    /// Rebuild a graph from a persisted snapshot.
    ///
    /// Nodes are restored first so links can be resolved by id. Link ids are
    /// trimmed like node ids; a link with a missing endpoint, or one not among
    /// the restored nodes, is dropped. Returns the graph
    /// and the number of dropped links.
    pub fn from_snapshot(snapshot: &GraphSnapshot) -> (Self, usize) {
        let mut graph = Graph::new();

        for pnode in &snapshot.nodes {
            if let Err(e) = graph.insert_node(&pnode.id) {
                log::debug!("Skipping snapshot node {:?}: {e}", pnode.id);
            }
        }

        let mut dropped = 0;
        for plink in &snapshot.links {
            let source = plink.source_id.as_deref().and_then(|id| graph.key_by_id(id.trim()));
            let target = plink.target_id.as_deref().and_then(|id| graph.key_by_id(id.trim()));
            match (source, target) {
                (Some(source), Some(target)) => {
                    graph.add_edge(source, target, plink.weight);
                },
                _ => dropped += 1,
            }
        }

        (graph, dropped)
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}
