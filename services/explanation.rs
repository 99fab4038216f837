/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Explanation capability: why is a thought linked to its neighbours?
//!
//! Independent of the graph core. Whatever the upstream model replies, the
//! caller always gets exactly one [`LinkExplanation`] per neighbour.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::config::ExplanationConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkExplanation {
    pub neighbor: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExplanationError {
    Transport(String),
    HttpStatus(u16),
}

impl std::fmt::Display for ExplanationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExplanationError::Transport(e) => write!(f, "Explanation transport error: {e}"),
            ExplanationError::HttpStatus(code) => {
                write!(f, "Explanation API returned HTTP {code}")
            },
        }
    }
}

impl std::error::Error for ExplanationError {}

#[async_trait]
pub trait ExplanationProvider: Send + Sync {
    /// Fetch the raw model reply for `center` and its `neighbors`.
    async fn request_reasons(
        &self,
        center: &str,
        neighbors: &[String],
    ) -> Result<String, ExplanationError>;
}

/// Explain each link from `center` to `neighbors`. Never fails: transport
/// errors and malformed replies degrade to templated reasons.
pub async fn explain_links(
    provider: &dyn ExplanationProvider,
    center: &str,
    neighbors: &[String],
) -> Vec<LinkExplanation> {
    if neighbors.is_empty() {
        return Vec::new();
    }
    match provider.request_reasons(center, neighbors).await {
        Ok(raw) => parse_explanations(&raw, center, neighbors),
        Err(e) => {
            log::warn!("Explanation request failed: {e}");
            fallback_explanations(center, neighbors)
        },
    }
}

pub fn fallback_reason(center: &str) -> String {
    format!("Related to \"{center}\" by overall meaning.")
}

pub fn fallback_explanations(center: &str, neighbors: &[String]) -> Vec<LinkExplanation> {
    neighbors
        .iter()
        .map(|neighbor| LinkExplanation {
            neighbor: neighbor.clone(),
            reason: fallback_reason(center),
        })
        .collect()
}

/// Match a model reply against the requested neighbours.
///
/// Accepts a bare JSON array, an object holding the array under `links` or
/// `explanations`, and either of those wrapped in a fenced code block. The
/// result follows `neighbors` order; anything unmatched gets the fallback.
pub fn parse_explanations(raw: &str, center: &str, neighbors: &[String]) -> Vec<LinkExplanation> {
    let parsed = extract_entries(raw).unwrap_or_else(|| {
        log::debug!("Explanation reply was not usable JSON; using fallback reasons");
        Vec::new()
    });

    neighbors
        .iter()
        .map(|neighbor| {
            let reason = parsed
                .iter()
                .find(|entry| entry.neighbor.trim().eq_ignore_ascii_case(neighbor.trim()))
                .map(|entry| entry.reason.trim().to_string())
                .filter(|reason| !reason.is_empty())
                .unwrap_or_else(|| fallback_reason(center));
            LinkExplanation {
                neighbor: neighbor.clone(),
                reason,
            }
        })
        .collect()
}

fn extract_entries(raw: &str) -> Option<Vec<LinkExplanation>> {
    let body = strip_code_fence(raw.trim());
    let value: Value = serde_json::from_str(body).ok()?;
    let list = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("links").or_else(|| map.remove("explanations")) {
            Some(Value::Array(items)) => items,
            _ => return None,
        },
        _ => return None,
    };
    Some(
        list.into_iter()
            .filter_map(|item| serde_json::from_value::<LinkExplanation>(item).ok())
            .collect(),
    )
}

fn strip_code_fence(raw: &str) -> &str {
    let Some(rest) = raw.strip_prefix("```") else {
        return raw;
    };
    // Drop an optional language tag on the opening fence.
    let rest = rest.split_once('\n').map_or(rest, |(_, body)| body);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// Offline provider: every neighbour gets the templated reason.
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplatedExplanations;

#[async_trait]
impl ExplanationProvider for TemplatedExplanations {
    async fn request_reasons(
        &self,
        _center: &str,
        _neighbors: &[String],
    ) -> Result<String, ExplanationError> {
        Ok("[]".to_string())
    }
}

/// Client for an OpenAI-compatible chat completions endpoint.
pub struct OpenAiExplanationClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiExplanationClient {
    pub fn from_config(config: &ExplanationConfig) -> Result<Self, ExplanationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ExplanationError::Transport(format!("{e}")))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key: std::env::var(&config.api_key_env).ok(),
        })
    }

    fn prompt(center: &str, neighbors: &[String]) -> String {
        let list = neighbors
            .iter()
            .map(|n| format!("- {n}"))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "Thought: \"{center}\"\nConnected thoughts:\n{list}\n\n\
             For each connected thought, give one short sentence on how it relates to the \
             thought. Reply with only a JSON array of objects with keys \"neighbor\" and \
             \"reason\"."
        )
    }
}

#[async_trait]
impl ExplanationProvider for OpenAiExplanationClient {
    async fn request_reasons(
        &self,
        center: &str,
        neighbors: &[String],
    ) -> Result<String, ExplanationError> {
        let body = json!({
            "model": self.model,
            "temperature": 0.3,
            "messages": [
                {"role": "system", "content": "You explain links in a personal thought graph."},
                {"role": "user", "content": Self::prompt(center, neighbors)},
            ],
        });
        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ExplanationError::Transport(format!("{e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ExplanationError::HttpStatus(status.as_u16()));
        }
        let reply: Value = response
            .json()
            .await
            .map_err(|e| ExplanationError::Transport(format!("{e}")))?;
        // A reply without message content is handed on as-is; parsing then
        // falls back per neighbour.
        Ok(reply
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| reply.to_string()))
    }
}
