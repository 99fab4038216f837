/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use thoughtweaver::app::GraphIntent;
use thoughtweaver::graph::GraphError;

use crate::support::{PrecomputedVectors, app, at_similarity, axis, edge_ids};

#[tokio::test]
async fn similar_pair_gets_one_weighted_edge() {
    let vectors = PrecomputedVectors::default()
        .with("apple", axis(0, 2))
        .with("banana", at_similarity(0.9, 2));
    let mut app = app(vectors);

    assert_eq!(app.add_thought_and_link("apple").await, Ok(0));
    assert_eq!(app.add_thought_and_link("banana").await, Ok(1));

    let edges = edge_ids(&app);
    assert_eq!(edges.len(), 1);
    let (source, target, weight) = &edges[0];
    assert_eq!((source.as_str(), target.as_str()), ("apple", "banana"));
    assert!((weight - 4.6).abs() < 1e-4, "weight was {weight}");
    assert_eq!(app.graph().neighbors_of("apple"), vec!["banana".to_string()]);
    app.shutdown().await;
}

#[tokio::test]
async fn dissimilar_pair_stays_unlinked() {
    let vectors = PrecomputedVectors::default()
        .with("apple", axis(0, 2))
        .with("car", at_similarity(0.1, 2));
    let mut app = app(vectors);

    app.add_thought_and_link("apple").await.unwrap();
    assert_eq!(app.add_thought_and_link("car").await, Ok(0));

    assert_eq!(app.graph().node_count(), 2);
    assert_eq!(app.graph().edge_count(), 0);
    assert_eq!(app.graph().degree_of("car"), 0);
    app.shutdown().await;
}

#[tokio::test]
async fn new_thought_links_only_to_its_two_best_matches() {
    // The query sits on axis 0; each earlier thought leans toward it by a
    // different amount and otherwise points along its own axis.
    let lean = |similarity: f32, own_axis: usize| {
        let mut vector = axis(own_axis, 4);
        vector[0] = similarity;
        vector[own_axis] = (1.0 - similarity * similarity).sqrt();
        vector
    };
    let vectors = PrecomputedVectors::default()
        .with("first", lean(0.9, 1))
        .with("second", lean(0.8, 2))
        .with("third", lean(0.5, 3))
        .with("query", axis(0, 4));
    let mut app = app(vectors);

    for text in ["first", "second", "third"] {
        app.add_thought_and_link(text).await.unwrap();
    }
    let before = app.graph().edge_count();

    assert_eq!(app.add_thought_and_link("query").await, Ok(2));
    assert_eq!(app.graph().edge_count(), before + 2);

    let mut neighbors = app.graph().neighbors_of("query");
    neighbors.sort();
    assert_eq!(neighbors, vec!["first".to_string(), "second".to_string()]);

    let query_edges: Vec<_> = edge_ids(&app)
        .into_iter()
        .filter(|(_, target, _)| target == "query")
        .collect();
    assert_eq!(query_edges.len(), 2);
    for (source, _, weight) in query_edges {
        let expected = if source == "first" { 4.6 } else { 4.2 };
        assert!((weight - expected).abs() < 1e-4, "{source}: {weight}");
    }
    app.shutdown().await;
}

#[tokio::test]
async fn duplicate_thoughts_never_change_the_graph() {
    let vectors = PrecomputedVectors::default()
        .with("Morning tea", axis(0, 2))
        .with("evening walk", at_similarity(0.9, 2));
    let mut app = app(vectors);

    app.add_thought_and_link("Morning tea").await.unwrap();
    app.add_thought_and_link("evening walk").await.unwrap();
    let nodes = app.graph().node_count();
    let edges = app.graph().edge_count();

    for variant in ["Morning tea", "  morning TEA ", "MORNING TEA"] {
        assert_eq!(
            app.add_thought_and_link(variant).await,
            Err(GraphError::Duplicate {
                existing: "Morning tea".to_string()
            })
        );
        assert_eq!(app.status(), Some("Already exists"));
    }
    assert_eq!(
        app.add_thought_and_link("   ").await,
        Err(GraphError::EmptyThought)
    );

    assert_eq!(app.graph().node_count(), nodes);
    assert_eq!(app.graph().edge_count(), edges);
    app.shutdown().await;
}

#[tokio::test]
async fn embedding_failure_keeps_the_thought_unlinked() {
    // "orphan" has no vector, so the embedder rejects the whole batch.
    let vectors = PrecomputedVectors::default().with("apple", axis(0, 2));
    let mut app = app(vectors);

    app.add_thought_and_link("apple").await.unwrap();
    assert_eq!(app.add_thought_and_link("orphan").await, Ok(0));

    assert!(app.graph().key_by_id("orphan").is_some());
    assert_eq!(app.graph().edge_count(), 0);
    assert_eq!(app.status(), Some("Embedding API failed"));
    app.shutdown().await;
}

#[tokio::test]
async fn queued_inserts_link_independently_once_settled() {
    let vectors = PrecomputedVectors::default()
        .with("apple", axis(0, 3))
        .with("banana", at_similarity(0.9, 3))
        .with("engine", axis(2, 3));
    let mut app = app(vectors);

    app.apply_intents(["apple", "banana", "engine"].map(|text| GraphIntent::AddThought {
        text: text.to_string(),
    }));
    // All three nodes exist before any link lands.
    assert_eq!(app.graph().node_count(), 3);
    assert_eq!(app.graph().edge_count(), 0);

    app.settle().await;
    assert_eq!(app.pending_workers(), 0);

    let edges = edge_ids(&app);
    assert_eq!(edges.len(), 1);
    assert_eq!((edges[0].0.as_str(), edges[0].1.as_str()), ("apple", "banana"));
    assert!(app.graph().neighbors_of("engine").is_empty());
    app.shutdown().await;
}

#[tokio::test]
async fn explanations_cover_every_neighbor() {
    let vectors = PrecomputedVectors::default()
        .with("apple", axis(0, 2))
        .with("banana", at_similarity(0.9, 2))
        .with("cherry", at_similarity(0.8, 2));
    let mut app = app(vectors);
    for text in ["apple", "banana", "cherry"] {
        app.add_thought_and_link(text).await.unwrap();
    }

    let explained = app.explain("APPLE").await.unwrap();
    let mut named: Vec<_> = explained.iter().map(|e| e.neighbor.as_str()).collect();
    named.sort();
    assert_eq!(named, vec!["banana", "cherry"]);
    assert!(explained.iter().all(|e| !e.reason.is_empty()));
    assert!(app.explain("durian").await.is_none());
    app.shutdown().await;
}
