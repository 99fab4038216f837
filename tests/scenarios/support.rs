/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thoughtweaver::app::ThoughtWeaverApp;
use thoughtweaver::persistence::SnapshotStore;
use thoughtweaver::services::embedding::{EmbeddingError, EmbeddingProvider};
use thoughtweaver::services::explanation::TemplatedExplanations;

pub const SLOT: &str = "tw-graph-v2-ai";

/// Embedder answering from a fixed table; unknown text is an error.
#[derive(Default)]
pub struct PrecomputedVectors {
    vectors: HashMap<String, Vec<f32>>,
}

impl PrecomputedVectors {
    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }
}

#[async_trait]
impl EmbeddingProvider for PrecomputedVectors {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts
            .iter()
            .map(|text| {
                self.vectors
                    .get(text)
                    .cloned()
                    .ok_or_else(|| EmbeddingError::Malformed(format!("no vector for {text:?}")))
            })
            .collect()
    }
}

/// Unit vector in the plane of the first two axes at cosine `similarity`
/// from `[1, 0, ...]`.
pub fn at_similarity(similarity: f32, dims: usize) -> Vec<f32> {
    let mut vector = vec![0.0; dims];
    vector[0] = similarity;
    vector[1] = (1.0 - similarity * similarity).sqrt();
    vector
}

pub fn axis(index: usize, dims: usize) -> Vec<f32> {
    let mut vector = vec![0.0; dims];
    vector[index] = 1.0;
    vector
}

pub fn app_with(embedder: impl EmbeddingProvider + 'static, snapshots: SnapshotStore) -> ThoughtWeaverApp {
    ThoughtWeaverApp::new(Arc::new(embedder), Arc::new(TemplatedExplanations), snapshots)
}

pub fn app(embedder: impl EmbeddingProvider + 'static) -> ThoughtWeaverApp {
    app_with(embedder, SnapshotStore::in_memory(SLOT))
}

/// Edges of the app's graph as `(source id, target id, weight)`.
pub fn edge_ids(app: &ThoughtWeaverApp) -> Vec<(String, String, f32)> {
    let graph = app.graph();
    graph
        .edges()
        .map(|edge| {
            (
                graph.get_node(edge.source).unwrap().id.clone(),
                graph.get_node(edge.target).unwrap().id.clone(),
                edge.weight,
            )
        })
        .collect()
}
