/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Cosine similarity scoring and ranking of embedding vectors.

/// One scored candidate: its position in the candidate slice and the
/// similarity to the query vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredCandidate {
    pub index: usize,
    pub similarity: f32,
}

/// Cosine similarity of two vectors.
///
/// Returns 0 when either vector has zero magnitude or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());
    // Rounding can push a parallel pair a hair past the bounds.
    similarity.clamp(-1.0, 1.0) as f32
}

/// Score every candidate against `query` and rank them by descending
/// similarity. Equal scores keep their input order.
pub fn score(query: &[f32], candidates: &[Vec<f32>]) -> Vec<ScoredCandidate> {
    let mut scored: Vec<ScoredCandidate> = candidates
        .iter()
        .enumerate()
        .map(|(index, candidate)| ScoredCandidate {
            index,
            similarity: cosine_similarity(query, candidate),
        })
        .collect();
    // `sort_by` is stable, which gives the input-order tie break.
    scored.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    scored
}
