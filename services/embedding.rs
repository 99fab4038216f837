/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Embedding capability: text in, one vector per text out, order preserved.
//!
//! Consumers hold an `Arc<dyn EmbeddingProvider>` so the auto-linker can be
//! driven by the HTTP client in the app and by fixed vectors in tests.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::EmbeddingConfig;

#[derive(Debug, Clone, PartialEq)]
pub enum EmbeddingError {
    Transport(String),
    HttpStatus(u16),
    Malformed(String),
    CountMismatch { expected: usize, actual: usize },
}

impl std::fmt::Display for EmbeddingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbeddingError::Transport(e) => write!(f, "Embedding transport error: {e}"),
            EmbeddingError::HttpStatus(code) => write!(f, "Embedding API returned HTTP {code}"),
            EmbeddingError::Malformed(e) => write!(f, "Malformed embedding response: {e}"),
            EmbeddingError::CountMismatch { expected, actual } => write!(
                f,
                "Embedding API returned {actual} vectors for {expected} inputs"
            ),
        }
    }
}

impl std::error::Error for EmbeddingError {}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed every text in one batched call. The result has exactly one
    /// vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

/// Client for an OpenAI-compatible `/v1/embeddings` endpoint.
pub struct OpenAiEmbeddingClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiEmbeddingClient {
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbeddingError::Transport(format!("{e}")))?;
        let api_key = std::env::var(&config.api_key_env).ok();
        if api_key.is_none() {
            log::warn!(
                "{} is not set; embedding requests will be sent without credentials",
                config.api_key_env
            );
        }
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut request = self.client.post(&self.endpoint).json(&EmbeddingRequest {
            model: &self.model,
            input: texts,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| EmbeddingError::Transport(format!("{e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(EmbeddingError::HttpStatus(status.as_u16()));
        }
        let body = response
            .text()
            .await
            .map_err(|e| EmbeddingError::Transport(format!("{e}")))?;
        vectors_from_response(&body, texts.len())
    }
}

/// Decode an embeddings response body, restoring input order by `index`.
pub(crate) fn vectors_from_response(
    body: &str,
    expected: usize,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let parsed: EmbeddingResponse =
        serde_json::from_str(body).map_err(|e| EmbeddingError::Malformed(format!("{e}")))?;
    if parsed.data.len() != expected {
        return Err(EmbeddingError::CountMismatch {
            expected,
            actual: parsed.data.len(),
        });
    }

    let mut data = parsed.data;
    if data.iter().all(|datum| datum.index.is_some()) {
        data.sort_by_key(|datum| datum.index);
    }
    Ok(data.into_iter().map(|datum| datum.embedding).collect())
}

const HASHED_DIMENSIONS: usize = 256;

/// Offline embedder: hashed bag of lowercase words.
///
/// Only texts sharing words score above zero, so it links far less
/// eagerly than a semantic model. Used when no embedding service is wanted.
#[derive(Debug, Default, Clone, Copy)]
pub struct HashedBagOfWords;

impl HashedBagOfWords {
    pub fn vector_for(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; HASHED_DIMENSIONS];
        for word in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|word| !word.is_empty())
        {
            vector[fnv1a(word) as usize % HASHED_DIMENSIONS] += 1.0;
        }
        vector
    }
}

fn fnv1a(word: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in word.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

#[async_trait]
impl EmbeddingProvider for HashedBagOfWords {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|text| Self::vector_for(text)).collect())
    }
}
