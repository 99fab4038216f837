/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Session state for the thought graph.
//!
//! [`ThoughtWeaverApp`] is the single owner of the [`Graph`]. Every mutation
//! arrives as a [`GraphIntent`] and is applied in order by
//! [`ThoughtWeaverApp::apply_intents`]; background work (auto-linking) reports
//! back through the control panel's queue instead of touching the graph.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::time::Instant;

use crate::config::{AppConfig, DEFAULT_STATUS_DURATION_MS};
use crate::graph::analysis::{extract_keywords, guess_category};
use crate::graph::auto_link::{self, AutoLinkOutcome, LinkPolicy};
use crate::graph::{Graph, GraphError, NodeKey};
use crate::layout::{
    ForceSimulation, LayoutCommand, LayoutHandle, LayoutParams, LayoutTopology, PositionSnapshot,
    spawn_layout_worker,
};
use crate::persistence::{FileKeyValueStore, PersistenceError, SnapshotStore};
use crate::runtime::ControlPanel;
use crate::services::embedding::{EmbeddingError, EmbeddingProvider};
use crate::services::explanation::{ExplanationProvider, LinkExplanation, explain_links};

/// Mutations and session commands, applied in order by the owner.
#[derive(Debug, Clone)]
pub enum GraphIntent {
    AddThought { text: String },
    /// Result of a finished auto-link task.
    ApplyAutoLinks(AutoLinkOutcome),
    AutoLinkFailed {
        node_id: String,
        error: EmbeddingError,
    },
    SaveSnapshot,
    LoadSnapshot,
    ToggleTheme,
    BeginDrag { id: String },
    DragTo { id: String, x: f32, y: f32 },
    EndDrag { id: String },
    ReheatLayout,
}

/// Changes the presentation layer must re-render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphEvent {
    NodeAdded { id: String },
    EdgesAdded { node_id: String, count: usize },
    GraphLoaded { nodes: usize, edges: usize },
    RedrawRequested,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Dark,
        }
    }
}

impl std::fmt::Display for Theme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Theme::Dark => write!(f, "dark"),
            Theme::Light => write!(f, "light"),
        }
    }
}

/// Transient, auto-dismissing message for the user.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusMessage {
    pub text: String,
    pub expires_at: Instant,
}

/// What the sidebar and detail view show for one thought.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDetails {
    pub id: String,
    pub degree: usize,
    pub neighbors: Vec<String>,
    pub category: String,
    pub keywords: Vec<String>,
}

pub struct ThoughtWeaverApp {
    graph: Graph,
    link_policy: LinkPolicy,
    snapshots: SnapshotStore,
    explainer: Arc<dyn ExplanationProvider>,
    control_panel: ControlPanel,
    layout: Option<LayoutHandle>,
    events: Vec<GraphEvent>,
    status: Option<StatusMessage>,
    status_duration: Duration,
    theme: Theme,
}

impl ThoughtWeaverApp {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        explainer: Arc<dyn ExplanationProvider>,
        snapshots: SnapshotStore,
    ) -> Self {
        Self {
            graph: Graph::new(),
            link_policy: LinkPolicy::default(),
            snapshots,
            explainer,
            control_panel: ControlPanel::new(embedder),
            layout: None,
            events: Vec::new(),
            status: None,
            status_duration: Duration::from_millis(DEFAULT_STATUS_DURATION_MS),
            theme: Theme::default(),
        }
    }

    /// Build a session from configuration, with the snapshot slot stored
    /// under the configured data directory.
    pub fn from_config(
        config: &AppConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        explainer: Arc<dyn ExplanationProvider>,
    ) -> Result<Self, PersistenceError> {
        let data_dir = config.storage.resolved_data_dir();
        let store = FileKeyValueStore::open(&data_dir)?;
        info!("Snapshot store at {}", store.path().display());
        let snapshots = SnapshotStore::new(Box::new(store), config.storage.slot.clone());
        Ok(Self::new(embedder, explainer, snapshots)
            .with_link_policy(config.linking.policy())
            .with_status_duration(Duration::from_millis(config.ui.status_duration_ms)))
    }

    pub fn with_link_policy(mut self, policy: LinkPolicy) -> Self {
        self.link_policy = policy;
        self
    }

    pub fn with_status_duration(mut self, duration: Duration) -> Self {
        self.status_duration = duration;
        self
    }

    /// Start the layout worker for the current graph. Must be called from
    /// within a tokio runtime. Replaces any running worker.
    pub fn attach_layout(&mut self, params: LayoutParams, tick_interval: Duration) {
        let mut simulation = ForceSimulation::new(params);
        simulation.rebind(&LayoutTopology::from_graph(&self.graph));
        let handle = spawn_layout_worker(simulation, tick_interval, self.control_panel.child_token());
        if let Some(previous) = self.layout.replace(handle) {
            previous.send(LayoutCommand::Shutdown);
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    /// Latest layout positions, if a layout worker is attached.
    pub fn positions(&self) -> Option<PositionSnapshot> {
        self.layout.as_ref().map(LayoutHandle::latest)
    }

    /// Current status text, until it expires.
    pub fn status(&self) -> Option<&str> {
        self.status
            .as_ref()
            .filter(|status| Instant::now() < status.expires_at)
            .map(|status| status.text.as_str())
    }

    /// Presentation events since the last call.
    pub fn take_events(&mut self) -> Vec<GraphEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn pending_workers(&self) -> usize {
        self.control_panel.worker_count()
    }

    /// Apply `intents` in order. Must be called from within a tokio runtime:
    /// adding a thought next to existing ones spawns its auto-link task.
    pub fn apply_intents<I>(&mut self, intents: I)
    where
        I: IntoIterator<Item = GraphIntent>,
    {
        for intent in intents {
            self.apply_intent(intent);
        }
    }

    fn apply_intent(&mut self, intent: GraphIntent) {
        match intent {
            GraphIntent::AddThought { text } => {
                if let Ok(key) = self.insert_thought(&text) {
                    if let Some(request) = auto_link::request_for(&self.graph, key) {
                        self.control_panel
                            .spawn_auto_link(request, self.link_policy);
                    }
                }
            },
            GraphIntent::ApplyAutoLinks(outcome) => {
                let count = auto_link::apply_links(&mut self.graph, &outcome);
                info!(
                    "Auto-link for {:?}: {count} of {} proposed links applied",
                    outcome.node_id,
                    outcome.proposals.len()
                );
                if count > 0 {
                    self.events.push(GraphEvent::EdgesAdded {
                        node_id: outcome.node_id,
                        count,
                    });
                    self.rebind_layout();
                }
            },
            GraphIntent::AutoLinkFailed { node_id, error } => {
                warn!("Auto-link for {node_id:?} failed: {error}");
                self.set_status("Embedding API failed");
            },
            GraphIntent::SaveSnapshot => match self.snapshots.save(&self.graph) {
                Ok(()) => self.set_status("Saved"),
                Err(e) => {
                    warn!("Failed to save graph: {e}");
                    self.set_status("Failed to save");
                },
            },
            GraphIntent::LoadSnapshot => self.load_snapshot(),
            GraphIntent::ToggleTheme => {
                self.theme = self.theme.toggled();
                debug!("Theme switched to {}", self.theme);
                self.events.push(GraphEvent::RedrawRequested);
            },
            GraphIntent::BeginDrag { id } => self.send_layout(LayoutCommand::BeginDrag { id }),
            GraphIntent::DragTo { id, x, y } => {
                self.send_layout(LayoutCommand::DragTo { id, x, y })
            },
            GraphIntent::EndDrag { id } => self.send_layout(LayoutCommand::EndDrag { id }),
            GraphIntent::ReheatLayout => self.send_layout(LayoutCommand::Reheat),
        }
    }

    /// Apply whatever background workers have reported so far. Call once
    /// per frame.
    pub fn apply_pending(&mut self) {
        let intents = self.control_panel.drain_pending();
        if !intents.is_empty() {
            self.apply_intents(intents);
        }
    }

    /// Wait for every in-flight auto-link task, then apply the results.
    pub async fn settle(&mut self) {
        self.control_panel.join_workers().await;
        self.apply_pending();
    }

    /// Insert `text` and link it inline, without the worker queue.
    ///
    /// Returns the number of edges created. An embedding failure is not an
    /// error here: the thought stays, unlinked, and the status says so.
    pub async fn add_thought_and_link(&mut self, text: &str) -> Result<usize, GraphError> {
        let key = self.insert_thought(text)?;
        let Some(request) = auto_link::request_for(&self.graph, key) else {
            return Ok(0);
        };

        let embedder = Arc::clone(self.control_panel.embedder());
        let intent = match auto_link::compute_links(embedder.as_ref(), &request, self.link_policy).await
        {
            Ok(outcome) => GraphIntent::ApplyAutoLinks(outcome),
            Err(error) => GraphIntent::AutoLinkFailed {
                node_id: request.node_id.clone(),
                error,
            },
        };
        let before = self.graph.edge_count();
        self.apply_intent(intent);
        Ok(self.graph.edge_count() - before)
    }

    /// Explain each link of the thought matching `text`. `None` if there is
    /// no such thought.
    pub async fn explain(&self, text: &str) -> Option<Vec<LinkExplanation>> {
        let id = self.resolve_id(text)?;
        let neighbors = self.graph.neighbors_of(&id);
        Some(explain_links(self.explainer.as_ref(), &id, &neighbors).await)
    }

    /// Details for the thought matching `text`, exactly or after
    /// normalization.
    pub fn node_details(&self, text: &str) -> Option<NodeDetails> {
        let id = self.resolve_id(text)?;
        Some(NodeDetails {
            degree: self.graph.degree_of(&id),
            neighbors: self.graph.neighbors_of(&id),
            category: guess_category(&id).to_string(),
            keywords: extract_keywords(&id),
            id,
        })
    }

    /// Cancel background work and stop the layout worker.
    pub async fn shutdown(mut self) {
        self.control_panel.shutdown().await;
        if let Some(layout) = self.layout.take() {
            layout.shutdown().await;
        }
    }

    fn resolve_id(&self, text: &str) -> Option<String> {
        let key = self
            .graph
            .key_by_id(text)
            .or_else(|| self.graph.key_by_normalized(text))?;
        self.graph.get_node(key).map(|node| node.id.clone())
    }

    fn insert_thought(&mut self, text: &str) -> Result<NodeKey, GraphError> {
        match self.graph.insert_node(text) {
            Ok(key) => {
                let id = self
                    .graph
                    .get_node(key)
                    .map(|node| node.id.clone())
                    .unwrap_or_default();
                info!("Thought added: {id:?}");
                self.events.push(GraphEvent::NodeAdded { id });
                self.set_status("Thought added");
                self.rebind_layout();
                Ok(key)
            },
            Err(GraphError::Duplicate { existing }) => {
                info!("Duplicate thought rejected (matches {existing:?})");
                self.set_status("Already exists");
                Err(GraphError::Duplicate { existing })
            },
            Err(e) => {
                debug!("Thought rejected: {e}");
                Err(e)
            },
        }
    }

    fn load_snapshot(&mut self) {
        match self.snapshots.load() {
            Ok(loaded) => {
                self.graph.replace_all(loaded.graph);
                self.events.push(GraphEvent::GraphLoaded {
                    nodes: self.graph.node_count(),
                    edges: self.graph.edge_count(),
                });
                self.set_status("Loaded");
                self.rebind_layout();
            },
            Err(PersistenceError::NothingToLoad) => {
                info!("Load requested but the slot is empty");
                self.set_status("No saved graph");
            },
            Err(e) => {
                warn!("Failed to load graph: {e}");
                self.set_status("Failed to load");
            },
        }
    }

    fn set_status(&mut self, text: &str) {
        self.status = Some(StatusMessage {
            text: text.to_string(),
            expires_at: Instant::now() + self.status_duration,
        });
    }

    fn rebind_layout(&self) {
        if self.layout.is_some() {
            self.send_layout(LayoutCommand::Rebind(LayoutTopology::from_graph(&self.graph)));
        }
    }

    fn send_layout(&self, command: LayoutCommand) {
        match &self.layout {
            Some(layout) => {
                layout.send(command);
            },
            None => debug!("No layout attached; ignoring {command:?}"),
        }
    }
}
