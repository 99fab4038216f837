/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Control Panel: async adapter between background workers and the
//! synchronous intent reducer.
//!
//! Workers never touch the graph. Each auto-link task embeds and scores on
//! its own, then sends one [`QueuedIntent`] back. The owner drains the channel
//! with [`ControlPanel::drain_pending`] and feeds the result to
//! `apply_intents`, so every link batch lands as a single reducer step.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::app::GraphIntent;
use crate::graph::auto_link::{AutoLinkRequest, LinkPolicy, compute_links};
use crate::services::embedding::EmbeddingProvider;

/// Capacity of the intent channel; limits flooding from async producers.
const INTENT_CHANNEL_CAPACITY: usize = 256;

/// Worker result waiting for the owner, stamped with its enqueue time.
#[derive(Debug, Clone)]
pub(crate) struct QueuedIntent {
    pub(crate) intent: GraphIntent,
    pub(crate) queued_at: Instant,
}

/// Owns:
/// - an intent `mpsc` channel (capacity [`INTENT_CHANNEL_CAPACITY`])
/// - a shared [`CancellationToken`] for worker shutdown
/// - a [`JoinSet`] supervising all background tasks
pub(crate) struct ControlPanel {
    /// Cloned to each background worker for intent submission.
    intent_tx: mpsc::Sender<QueuedIntent>,
    /// Drained by the owner via [`Self::drain_pending`].
    intent_rx: mpsc::Receiver<QueuedIntent>,
    embedder: Arc<dyn EmbeddingProvider>,
    /// Shared cancellation token; `cancel()` stops all supervised workers.
    cancel: CancellationToken,
    workers: JoinSet<()>,
}

impl ControlPanel {
    pub(crate) fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        let (intent_tx, intent_rx) = mpsc::channel(INTENT_CHANNEL_CAPACITY);
        Self {
            intent_tx,
            intent_rx,
            embedder,
            cancel: CancellationToken::new(),
            workers: JoinSet::new(),
        }
    }

    /// Token that is cancelled together with every supervised worker.
    pub(crate) fn child_token(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    pub(crate) fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Drain all pending intents from async producers (non-blocking).
    ///
    /// Also reaps finished worker tasks. Returns an empty `Vec` if nothing
    /// is queued.
    pub(crate) fn drain_pending(&mut self) -> Vec<GraphIntent> {
        while let Some(result) = self.workers.try_join_next() {
            if let Err(e) = result {
                log::warn!("control_panel: worker ended abnormally ({e})");
            }
        }
        let mut intents = Vec::new();
        while let Ok(queued) = self.intent_rx.try_recv() {
            log::trace!(
                "control_panel: intent waited {:?}",
                queued.queued_at.elapsed()
            );
            intents.push(queued.intent);
        }
        intents
    }

    /// Spawn an auto-link task for `request`.
    ///
    /// The task resolves to exactly one intent: `ApplyAutoLinks` with the
    /// chosen links, or `AutoLinkFailed` when embedding failed.
    pub(crate) fn spawn_auto_link(&mut self, request: AutoLinkRequest, policy: LinkPolicy) {
        let cancel = self.cancel.clone();
        let tx = self.intent_tx.clone();
        let embedder = Arc::clone(&self.embedder);
        log::debug!(
            "control_panel: auto-link spawned for {:?} against {} thoughts",
            request.node_id,
            request.existing_ids.len()
        );
        self.workers.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    log::debug!("control_panel: auto-link for {:?} cancelled", request.node_id);
                }
                _ = auto_link_worker(embedder, request.clone(), policy, tx) => {}
            }
        });
    }

    /// Wait for every supervised task to finish on its own.
    pub(crate) async fn join_workers(&mut self) {
        while let Some(result) = self.workers.join_next().await {
            if let Err(e) = result {
                log::warn!("control_panel: worker ended abnormally ({e})");
            }
        }
    }

    /// Cancel all supervised workers and await their completion.
    pub(crate) async fn shutdown(&mut self) {
        log::debug!(
            "control_panel: shutdown requested, cancelling {} workers",
            self.workers.len()
        );
        self.cancel.cancel();
        self.join_workers().await;
        log::debug!("control_panel: all workers joined");
    }

    /// Number of background workers currently supervised.
    pub(crate) fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

async fn auto_link_worker(
    embedder: Arc<dyn EmbeddingProvider>,
    request: AutoLinkRequest,
    policy: LinkPolicy,
    tx: mpsc::Sender<QueuedIntent>,
) {
    let intent = match compute_links(embedder.as_ref(), &request, policy).await {
        Ok(outcome) => GraphIntent::ApplyAutoLinks(outcome),
        Err(error) => GraphIntent::AutoLinkFailed {
            node_id: request.node_id.clone(),
            error,
        },
    };
    let queued = QueuedIntent {
        intent,
        queued_at: Instant::now(),
    };
    // Link results must not be dropped, so wait for room.
    if let Err(e) = tx.send(queued).await {
        log::debug!("control_panel: auto-link result dropped ({e})");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::embedding::{EmbeddingError, HashedBagOfWords};
    use async_trait::async_trait;
    use std::time::Duration;

    struct Unavailable;

    #[async_trait]
    impl EmbeddingProvider for Unavailable {
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Err(EmbeddingError::Transport("connection refused".to_string()))
        }
    }

    /// Never answers; stands in for a hung embedding service.
    struct Hung;

    #[async_trait]
    impl EmbeddingProvider for Hung {
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            std::future::pending().await
        }
    }

    fn request() -> AutoLinkRequest {
        AutoLinkRequest {
            node_id: "morning tea".to_string(),
            existing_ids: vec!["green tea in the morning".to_string(), "tax filing".to_string()],
            generation: 0,
        }
    }

    #[tokio::test]
    async fn control_panel_new_creates_open_channel() {
        let panel = ControlPanel::new(Arc::new(HashedBagOfWords));
        assert!(!panel.intent_tx.is_closed());
    }

    #[tokio::test]
    async fn drain_pending_returns_empty_when_no_intents() {
        let mut panel = ControlPanel::new(Arc::new(HashedBagOfWords));
        assert!(panel.drain_pending().is_empty());
    }

    #[tokio::test]
    async fn auto_link_emits_one_apply_intent() {
        let mut panel = ControlPanel::new(Arc::new(HashedBagOfWords));
        panel.spawn_auto_link(request(), LinkPolicy::default());
        assert_eq!(panel.worker_count(), 1);

        panel.join_workers().await;
        let drained = panel.drain_pending();
        assert_eq!(drained.len(), 1);
        match &drained[0] {
            GraphIntent::ApplyAutoLinks(outcome) => {
                assert_eq!(outcome.node_id, "morning tea");
                let ids: Vec<&str> =
                    outcome.proposals.iter().map(|p| p.candidate_id.as_str()).collect();
                assert_eq!(ids, vec!["green tea in the morning"]);
            },
            other => panic!("unexpected intent {other:?}"),
        }
    }

    #[tokio::test]
    async fn auto_link_failure_is_reported_as_intent() {
        let mut panel = ControlPanel::new(Arc::new(Unavailable));
        panel.spawn_auto_link(request(), LinkPolicy::default());

        let received = tokio::time::timeout(Duration::from_secs(2), panel.intent_rx.recv())
            .await
            .expect("worker should emit an intent")
            .expect("channel should remain open");

        assert!(matches!(
            received.intent,
            GraphIntent::AutoLinkFailed { ref node_id, error: EmbeddingError::Transport(_) }
                if node_id == "morning tea"
        ));
        assert!(received.queued_at <= Instant::now());
    }

    #[tokio::test]
    async fn shutdown_completes_with_no_workers() {
        let mut panel = ControlPanel::new(Arc::new(HashedBagOfWords));
        panel.shutdown().await;
        assert_eq!(panel.worker_count(), 0);
    }

    #[tokio::test]
    async fn shutdown_cancels_hung_auto_link() {
        let mut panel = ControlPanel::new(Arc::new(Hung));
        let child = panel.child_token();
        panel.spawn_auto_link(request(), LinkPolicy::default());

        tokio::time::timeout(Duration::from_secs(2), panel.shutdown())
            .await
            .expect("shutdown should not wait on a hung worker");
        assert_eq!(panel.worker_count(), 0);
        assert!(child.is_cancelled());
        assert!(panel.drain_pending().is_empty());
    }
}
