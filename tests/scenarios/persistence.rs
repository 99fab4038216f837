/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use thoughtweaver::app::{GraphEvent, GraphIntent};
use thoughtweaver::persistence::{FileKeyValueStore, KeyValueStore, SnapshotStore};

use crate::support::{PrecomputedVectors, SLOT, app, app_with, at_similarity, axis};

fn fruit_vectors() -> PrecomputedVectors {
    PrecomputedVectors::default()
        .with("apple", axis(0, 3))
        .with("banana", at_similarity(0.9, 3))
        .with("Cherry", at_similarity(0.7, 3))
        .with("engine", axis(2, 3))
}

fn file_snapshots(dir: &std::path::Path) -> SnapshotStore {
    SnapshotStore::new(Box::new(FileKeyValueStore::open(dir).unwrap()), SLOT)
}

#[tokio::test]
async fn saved_graph_reloads_identically_across_sessions() {
    let dir = tempfile::tempdir().unwrap();

    let mut first = app_with(fruit_vectors(), file_snapshots(dir.path()));
    for text in ["apple", "banana", "Cherry", "engine"] {
        first.add_thought_and_link(text).await.unwrap();
    }
    first.apply_intents([GraphIntent::SaveSnapshot]);
    assert_eq!(first.status(), Some("Saved"));
    let saved = first.graph().to_snapshot();
    first.shutdown().await;

    let mut second = app_with(fruit_vectors(), file_snapshots(dir.path()));
    second.apply_intents([GraphIntent::LoadSnapshot]);
    assert_eq!(second.status(), Some("Loaded"));
    assert_eq!(second.graph().to_snapshot(), saved);
    assert!(second.take_events().contains(&GraphEvent::GraphLoaded {
        nodes: saved.nodes.len(),
        edges: saved.links.len(),
    }));

    // Loaded ids still guard against duplicates.
    assert!(second.add_thought_and_link("cherry").await.is_err());
    second.shutdown().await;
}

#[tokio::test]
async fn dangling_links_are_dropped_on_load() {
    let dir = tempfile::tempdir().unwrap();
    let raw = r#"{
        "nodes": [{"id": "apple"}, {"id": "banana"}],
        "links": [
            {"sourceId": "apple", "targetId": "banana", "weight": 4.6},
            {"sourceId": "apple", "targetId": "ghost", "weight": 3.0},
            {"sourceId": "ghost", "targetId": "banana"},
            {"sourceId": "banana", "targetId": "apple"}
        ]
    }"#;
    FileKeyValueStore::open(dir.path())
        .unwrap()
        .set(SLOT, raw)
        .unwrap();

    let loaded = file_snapshots(dir.path()).load().unwrap();
    assert_eq!(loaded.dropped_links, 2);
    assert_eq!(loaded.graph.node_count(), 2);
    assert_eq!(loaded.graph.edge_count(), 2);
    // Parallel links collapse in the neighbour view.
    assert_eq!(loaded.graph.neighbors_of("apple"), vec!["banana".to_string()]);
    assert_eq!(loaded.graph.degree_of("apple"), 2);

    let weights: Vec<f32> = loaded.graph.edges().map(|edge| edge.weight).collect();
    assert_eq!(weights, vec![4.6, 1.0]);
}

#[tokio::test]
async fn failed_load_leaves_the_live_graph_alone() {
    let mut app = app(fruit_vectors());
    app.add_thought_and_link("apple").await.unwrap();
    app.add_thought_and_link("banana").await.unwrap();
    let before = app.graph().to_snapshot();

    app.apply_intents([GraphIntent::LoadSnapshot]);
    assert_eq!(app.status(), Some("No saved graph"));
    assert_eq!(app.graph().to_snapshot(), before);
    app.shutdown().await;
}

#[tokio::test]
async fn corrupt_slot_reports_failure_without_touching_the_graph() {
    let dir = tempfile::tempdir().unwrap();
    FileKeyValueStore::open(dir.path())
        .unwrap()
        .set(SLOT, "{not json")
        .unwrap();

    let mut app = app_with(fruit_vectors(), file_snapshots(dir.path()));
    app.add_thought_and_link("apple").await.unwrap();
    app.apply_intents([GraphIntent::LoadSnapshot]);

    assert_eq!(app.status(), Some("Failed to load"));
    assert_eq!(app.graph().node_count(), 1);
    app.shutdown().await;
}
