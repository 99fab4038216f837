/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Similarity-driven auto-linking of a newly inserted thought.
//!
//! Split into three phases so the embedding call can run off the graph owner:
//! [`request_for`] snapshots ids from the graph, [`compute_links`] embeds and
//! scores without touching the graph, and [`apply_links`] appends the edges in
//! one step. An outcome computed against an older graph generation is refused.

use super::similarity::score;
use super::{Graph, NodeKey};
use crate::services::embedding::{EmbeddingError, EmbeddingProvider};

/// Candidates scoring below this are never linked. Inclusive.
pub const DEFAULT_LINK_THRESHOLD: f32 = 0.35;

/// At most this many edges are created per new thought.
pub const DEFAULT_MAX_LINKS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkPolicy {
    pub threshold: f32,
    pub max_links: usize,
}

impl Default for LinkPolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_LINK_THRESHOLD,
            max_links: DEFAULT_MAX_LINKS,
        }
    }
}

/// Edge weight for a similarity score; `[1, 5]` for cosine scores in `[0, 1]`.
pub fn link_weight(similarity: f32) -> f32 {
    1.0 + similarity * 4.0
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinkProposal {
    pub candidate_id: String,
    pub similarity: f32,
    pub weight: f32,
}

/// Everything the embedding phase needs, detached from the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoLinkRequest {
    pub node_id: String,
    pub existing_ids: Vec<String>,
    pub generation: u64,
}

impl AutoLinkRequest {
    /// Batch sent to the embedder: the new thought first, then every other
    /// thought in insertion order.
    pub fn texts(&self) -> Vec<String> {
        std::iter::once(self.node_id.clone())
            .chain(self.existing_ids.iter().cloned())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AutoLinkOutcome {
    pub node_id: String,
    pub generation: u64,
    pub proposals: Vec<LinkProposal>,
}

/// Build the request for the thought at `key`, or `None` when it has
/// nothing to link against.
pub fn request_for(graph: &Graph, key: NodeKey) -> Option<AutoLinkRequest> {
    let node = graph.get_node(key)?;
    let existing_ids: Vec<String> = graph
        .nodes()
        .filter(|(other, _)| *other != key)
        .map(|(_, other)| other.id.clone())
        .collect();
    if existing_ids.is_empty() {
        return None;
    }
    Some(AutoLinkRequest {
        node_id: node.id.clone(),
        existing_ids,
        generation: graph.generation(),
    })
}

/// Score `vectors[1..]` against `vectors[0]` and keep the best candidates
/// at or above the policy threshold.
pub fn select_links(
    request: &AutoLinkRequest,
    vectors: &[Vec<f32>],
    policy: LinkPolicy,
) -> Vec<LinkProposal> {
    let Some((query, candidates)) = vectors.split_first() else {
        return Vec::new();
    };
    score(query, candidates)
        .into_iter()
        .filter(|scored| scored.similarity >= policy.threshold)
        .take(policy.max_links)
        .filter_map(|scored| {
            let candidate_id = request.existing_ids.get(scored.index)?;
            Some(LinkProposal {
                candidate_id: candidate_id.clone(),
                similarity: scored.similarity,
                weight: link_weight(scored.similarity),
            })
        })
        .collect()
}

/// Embed the request's texts in one batch and pick links. Any embedding
/// failure aborts linking for this thought.
pub async fn compute_links(
    provider: &dyn EmbeddingProvider,
    request: &AutoLinkRequest,
    policy: LinkPolicy,
) -> Result<AutoLinkOutcome, EmbeddingError> {
    let texts = request.texts();
    let vectors = provider.embed(&texts).await?;
    if vectors.len() != texts.len() {
        return Err(EmbeddingError::CountMismatch {
            expected: texts.len(),
            actual: vectors.len(),
        });
    }
    Ok(AutoLinkOutcome {
        node_id: request.node_id.clone(),
        generation: request.generation,
        proposals: select_links(request, &vectors, policy),
    })
}

/// Append the outcome's edges, each from candidate to the new thought.
///
/// Returns the number of edges added. Nothing is added when the graph was
/// replaced since the request was built, or when the new thought is gone;
/// proposals naming a missing candidate are skipped.
pub fn apply_links(graph: &mut Graph, outcome: &AutoLinkOutcome) -> usize {
    if outcome.generation != graph.generation() {
        log::debug!(
            "Dropping {} stale link proposals for {:?} (generation {} != {})",
            outcome.proposals.len(),
            outcome.node_id,
            outcome.generation,
            graph.generation()
        );
        return 0;
    }
    let Some(target) = graph.key_by_id(&outcome.node_id) else {
        log::debug!("Dropping link proposals for missing thought {:?}", outcome.node_id);
        return 0;
    };

    let mut added = 0;
    for proposal in &outcome.proposals {
        let Some(source) = graph.key_by_id(&proposal.candidate_id) else {
            log::debug!("Skipping link to missing thought {:?}", proposal.candidate_id);
            continue;
        };
        if graph.add_edge(source, target, proposal.weight).is_some() {
            added += 1;
        }
    }
    added
}
