/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Single-slot snapshot persistence.
//!
//! The graph is saved whole, as JSON, under one key of a small key-value
//! store. There is no journal and no history: every save overwrites the slot
//! and every load replaces the in-memory graph.

pub mod types;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::graph::Graph;
use types::GraphSnapshot;

const STORE_FILE_NAME: &str = "store.json";

/// Errors from the snapshot store
#[derive(Debug, Clone, PartialEq)]
pub enum PersistenceError {
    Io(String),
    Parse(String),
    /// The slot has never been written.
    NothingToLoad,
}

impl std::fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistenceError::Io(e) => write!(f, "IO error: {e}"),
            PersistenceError::Parse(e) => write!(f, "Parse error: {e}"),
            PersistenceError::NothingToLoad => write!(f, "No saved graph"),
        }
    }
}

impl std::error::Error for PersistenceError {}

/// String-keyed storage for raw values.
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistenceError>;
}

/// In-memory store; contents die with the process.
#[derive(Debug, Default, Clone)]
pub struct MemoryKeyValueStore {
    entries: HashMap<String, String>,
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistenceError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Store backed by one JSON object file (`store.json`) in a directory.
///
/// The whole file is rewritten on each `set`, through a temporary file and
/// a rename so a crash never leaves it half-written.
#[derive(Debug)]
pub struct FileKeyValueStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl FileKeyValueStore {
    /// Open or create the store in `base_dir`.
    pub fn open(base_dir: &Path) -> Result<Self, PersistenceError> {
        std::fs::create_dir_all(base_dir)
            .map_err(|e| PersistenceError::Io(format!("Failed to create dir: {e}")))?;
        let path = base_dir.join(STORE_FILE_NAME);

        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
                PersistenceError::Parse(format!("{}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(PersistenceError::Io(format!("{}: {e}", path.display()))),
        };

        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), PersistenceError> {
        let body = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| PersistenceError::Parse(format!("{e}")))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, body)
            .map_err(|e| PersistenceError::Io(format!("Failed to write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            PersistenceError::Io(format!("Failed to replace {}: {e}", self.path.display()))
        })
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistenceError> {
        let previous = self.entries.insert(key.to_string(), value.to_string());
        if let Err(e) = self.flush() {
            // Keep memory in step with disk.
            match previous {
                Some(previous) => self.entries.insert(key.to_string(), previous),
                None => self.entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }
}

/// A graph restored from the slot.
#[derive(Debug)]
pub struct LoadedGraph {
    pub graph: Graph,
    /// Links whose endpoints were not among the saved nodes.
    pub dropped_links: usize,
}

/// Saves and loads the graph under a single key.
pub struct SnapshotStore {
    store: Box<dyn KeyValueStore>,
    slot: String,
}

impl SnapshotStore {
    pub fn new(store: Box<dyn KeyValueStore>, slot: impl Into<String>) -> Self {
        Self {
            store,
            slot: slot.into(),
        }
    }

    /// Snapshot store that forgets everything on exit.
    pub fn in_memory(slot: impl Into<String>) -> Self {
        Self::new(Box::new(MemoryKeyValueStore::default()), slot)
    }

    pub fn slot(&self) -> &str {
        &self.slot
    }

    /// Overwrite the slot with `graph`.
    pub fn save(&mut self, graph: &Graph) -> Result<(), PersistenceError> {
        let body = serde_json::to_string(&graph.to_snapshot())
            .map_err(|e| PersistenceError::Parse(format!("{e}")))?;
        self.store.set(&self.slot, &body)?;
        info!(
            "Saved {} thoughts and {} links to slot {:?}",
            graph.node_count(),
            graph.edge_count(),
            self.slot
        );
        Ok(())
    }

    /// Read the slot into a fresh graph. Never touches any live graph; the
    /// caller swaps the result in only on success.
    pub fn load(&self) -> Result<LoadedGraph, PersistenceError> {
        let raw = self
            .store
            .get(&self.slot)?
            .ok_or(PersistenceError::NothingToLoad)?;
        let snapshot: GraphSnapshot =
            serde_json::from_str(&raw).map_err(|e| PersistenceError::Parse(format!("{e}")))?;

        let (graph, dropped_links) = Graph::from_snapshot(&snapshot);
        if dropped_links > 0 {
            warn!("Dropped {dropped_links} links with unknown endpoints while loading");
        }
        info!(
            "Loaded {} thoughts and {} links from slot {:?}",
            graph.node_count(),
            graph.edge_count(),
            self.slot
        );
        Ok(LoadedGraph {
            graph,
            dropped_links,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SLOT: &str = "tw-graph-v2-ai";

    fn sample_graph() -> Graph {
        let mut graph = Graph::new();
        let a = graph.insert_node("apple").unwrap();
        let b = graph.insert_node("banana").unwrap();
        graph.add_edge(a, b, 4.6);
        graph
    }

    #[test]
    fn test_load_empty_slot_is_nothing_to_load() {
        let store = SnapshotStore::in_memory(SLOT);
        assert_eq!(store.load().unwrap_err(), PersistenceError::NothingToLoad);
    }

    #[test]
    fn test_save_then_load_in_memory() {
        let mut store = SnapshotStore::in_memory(SLOT);
        store.save(&sample_graph()).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.dropped_links, 0);
        assert_eq!(loaded.graph.to_snapshot(), sample_graph().to_snapshot());
    }

    #[test]
    fn test_malformed_slot_is_parse_error() {
        let mut kv = MemoryKeyValueStore::default();
        kv.set(SLOT, "{\"nodes\": [").unwrap();
        let store = SnapshotStore::new(Box::new(kv), SLOT);

        assert!(matches!(store.load(), Err(PersistenceError::Parse(_))));
    }

    #[test]
    fn test_load_reports_dropped_links_and_defaults_weight() {
        let mut kv = MemoryKeyValueStore::default();
        kv.set(
            SLOT,
            r#"{"nodes":[{"id":"a"},{"id":"b"}],
                "links":[{"sourceId":"a","targetId":"b"},
                         {"sourceId":"a","targetId":"zzz","weight":3}]}"#,
        )
        .unwrap();
        let store = SnapshotStore::new(Box::new(kv), SLOT);

        let loaded = store.load().unwrap();
        assert_eq!(loaded.dropped_links, 1);
        assert_eq!(loaded.graph.edge_count(), 1);
        assert_eq!(loaded.graph.edges().next().unwrap().weight, 1.0);
    }

    #[test]
    fn test_link_missing_an_endpoint_field_does_not_fail_load() {
        let mut kv = MemoryKeyValueStore::default();
        kv.set(
            SLOT,
            r#"{"nodes":[{"id":"a"},{"id":"b"}],
                "links":[{"sourceId":"a","targetId":"b","weight":2},
                         {"sourceId":"a","weight":3}]}"#,
        )
        .unwrap();
        let store = SnapshotStore::new(Box::new(kv), SLOT);

        let loaded = store.load().unwrap();
        assert_eq!(loaded.dropped_links, 1);
        assert_eq!(loaded.graph.node_count(), 2);
        assert_eq!(loaded.graph.edge_count(), 1);
        assert_eq!(loaded.graph.edges().next().unwrap().weight, 2.0);
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let kv = FileKeyValueStore::open(dir.path()).unwrap();
            let mut store = SnapshotStore::new(Box::new(kv), SLOT);
            store.save(&sample_graph()).unwrap();
        }

        let kv = FileKeyValueStore::open(dir.path()).unwrap();
        assert!(kv.path().ends_with("store.json"));
        let store = SnapshotStore::new(Box::new(kv), SLOT);
        assert_eq!(store.load().unwrap().graph.node_count(), 2);
    }

    #[test]
    fn test_file_store_keeps_other_keys() {
        let dir = TempDir::new().unwrap();
        let mut kv = FileKeyValueStore::open(dir.path()).unwrap();
        kv.set("theme", "dark").unwrap();
        kv.set(SLOT, "{}").unwrap();

        let reopened = FileKeyValueStore::open(dir.path()).unwrap();
        assert_eq!(reopened.get("theme").unwrap().as_deref(), Some("dark"));
        assert_eq!(reopened.get(SLOT).unwrap().as_deref(), Some("{}"));
        assert_eq!(reopened.get("missing").unwrap(), None);
    }

    #[test]
    fn test_file_store_rejects_corrupt_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("store.json"), "not json").unwrap();
        assert!(matches!(
            FileKeyValueStore::open(dir.path()),
            Err(PersistenceError::Parse(_))
        ));
    }

    #[test]
    fn test_empty_object_loads_empty_graph() {
        let mut kv = MemoryKeyValueStore::default();
        kv.set(SLOT, "{}").unwrap();
        let store = SnapshotStore::new(Box::new(kv), SLOT);

        let loaded = store.load().unwrap();
        assert_eq!(loaded.graph.node_count(), 0);
        assert_eq!(loaded.dropped_links, 0);
    }
}
