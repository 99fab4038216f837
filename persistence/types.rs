/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Serializable types for graph persistence.
//!
//! Edges are flattened to id pairs; the live graph's node handles never
//! reach the wire.

use serde::{Deserialize, Serialize};

/// Persisted node.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PersistedNode {
    pub id: String,
}

/// Persisted link between two node ids.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PersistedLink {
    /// A missing endpoint leaves the link unresolvable; loading drops it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    /// Missing, null and zero weights all read back as 1.
    #[serde(default = "default_link_weight", deserialize_with = "deserialize_weight")]
    pub weight: f32,
}

/// Full graph snapshot stored in the single persistence slot.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct GraphSnapshot {
    #[serde(default, deserialize_with = "deserialize_list")]
    pub nodes: Vec<PersistedNode>,
    #[serde(default, deserialize_with = "deserialize_list")]
    pub links: Vec<PersistedLink>,
}

pub(crate) const DEFAULT_LINK_WEIGHT: f32 = 1.0;

fn default_link_weight() -> f32 {
    DEFAULT_LINK_WEIGHT
}

fn deserialize_weight<'de, D>(deserializer: D) -> Result<f32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let weight = Option::<f32>::deserialize(deserializer)?;
    Ok(match weight {
        Some(weight) if weight != 0.0 && weight.is_finite() => weight,
        _ => DEFAULT_LINK_WEIGHT,
    })
}

fn deserialize_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
