/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! TOML configuration. Every field has a default, so an absent or partial
//! file is valid.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::graph::auto_link::{DEFAULT_LINK_THRESHOLD, DEFAULT_MAX_LINKS, LinkPolicy};
use crate::layout::LayoutParams;

pub const DEFAULT_SNAPSHOT_SLOT: &str = "tw-graph-v2-ai";
pub const DEFAULT_STATUS_DURATION_MS: u64 = 2200;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub embedding: EmbeddingConfig,
    pub explanation: ExplanationConfig,
    pub linking: LinkingConfig,
    pub layout: LayoutConfig,
    pub storage: StorageConfig,
    pub ui: UiConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/embeddings".to_string(),
            model: "text-embedding-3-small".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExplanationConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for ExplanationConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LinkingConfig {
    pub threshold: f32,
    pub max_links: usize,
}

impl Default for LinkingConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_LINK_THRESHOLD,
            max_links: DEFAULT_MAX_LINKS,
        }
    }
}

impl LinkingConfig {
    pub fn policy(&self) -> LinkPolicy {
        LinkPolicy {
            threshold: self.threshold,
            max_links: self.max_links,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LayoutConfig {
    pub width: f32,
    pub height: f32,
    pub link_distance: f32,
    pub charge_strength: f32,
    pub collide_radius: f32,
    pub tick_interval_ms: u64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        let params = LayoutParams::default();
        Self {
            width: 1280.0,
            height: 800.0,
            link_distance: params.link_distance,
            charge_strength: params.charge_strength,
            collide_radius: params.collide_radius,
            tick_interval_ms: 16,
        }
    }
}

impl LayoutConfig {
    pub fn params(&self) -> LayoutParams {
        LayoutParams {
            link_distance: self.link_distance,
            charge_strength: self.charge_strength,
            collide_radius: self.collide_radius,
            center: euclid::default::Point2D::new(self.width / 2.0, self.height / 2.0),
            ..LayoutParams::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: Option<PathBuf>,
    pub slot: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            slot: DEFAULT_SNAPSHOT_SLOT.to_string(),
        }
    }
}

impl StorageConfig {
    /// Configured data directory, else `<data_dir>/thoughtweaver`.
    pub fn resolved_data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            let mut dir = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
            dir.push("thoughtweaver");
            dir
        })
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct UiConfig {
    pub status_duration_ms: u64,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            status_duration_ms: DEFAULT_STATUS_DURATION_MS,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(String),
    Parse(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Config IO error: {e}"),
            ConfigError::Parse(e) => write!(f, "Config parse error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl AppConfig {
    /// `<config_dir>/thoughtweaver/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        let mut path = dirs::config_dir()?;
        path.push("thoughtweaver");
        path.push("config.toml");
        Some(path)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|e| ConfigError::Parse(format!("{e}")))
    }

    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Self::from_toml_str(&raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No config at {}; using defaults", path.display());
                Ok(Self::default())
            },
            Err(e) => Err(ConfigError::Io(format!("{}: {e}", path.display()))),
        }
    }
}
