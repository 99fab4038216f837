/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Layout worker: owns a [`ForceSimulation`] and steps it on a fixed
//! interval until cancelled.
//!
//! Consumers never touch the simulation. They send [`LayoutCommand`]s and
//! read the latest [`PositionSnapshot`] from a watch channel, so a slow
//! reader only ever sees the newest positions.
//!
//! The command queue is unbounded: a release or rebind must never be lost
//! behind a burst of drag moves. The worker drains everything queued on each
//! wakeup, so the queue stays short.

use std::time::Duration;

use euclid::default::Point2D;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::{ForceSimulation, LayoutTopology, PositionSnapshot};

#[derive(Debug, Clone, PartialEq)]
pub enum LayoutCommand {
    /// Node or edge set changed.
    Rebind(LayoutTopology),
    BeginDrag { id: String },
    DragTo { id: String, x: f32, y: f32 },
    EndDrag { id: String },
    Reheat,
    Shutdown,
}

struct LayoutWorker {
    simulation: ForceSimulation,
    command_rx: mpsc::UnboundedReceiver<LayoutCommand>,
    positions_tx: watch::Sender<PositionSnapshot>,
    cancel: CancellationToken,
    tick_interval: Duration,
}

impl LayoutWorker {
    async fn run(mut self) {
        log::info!(
            "Layout worker started ({} nodes, tick {:?})",
            self.simulation.node_count(),
            self.tick_interval
        );
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    log::info!("Layout worker stopping (cancellation requested)");
                    break;
                }

                command = self.command_rx.recv() => {
                    let keep_running = match command {
                        Some(command) => self.handle_queued(command),
                        None => false,
                    };
                    if !keep_running {
                        log::info!("Layout worker stopping (shutdown command or handle dropped)");
                        break;
                    }
                }

                _ = ticker.tick() => {
                    if self.simulation.step() {
                        self.publish();
                    }
                }
            }
        }
    }

    /// Apply `first` and everything queued behind it, then publish once.
    /// Returns `false` on shutdown.
    fn handle_queued(&mut self, first: LayoutCommand) -> bool {
        let mut next = Some(first);
        let mut handled = 0_usize;
        while let Some(command) = next {
            if matches!(command, LayoutCommand::Shutdown) {
                return false;
            }
            self.handle(command);
            handled += 1;
            next = self.command_rx.try_recv().ok();
        }
        if handled > 1 {
            log::trace!("layout: applied {handled} queued commands");
        }
        self.publish();
        true
    }

    fn handle(&mut self, command: LayoutCommand) {
        let applied = match &command {
            LayoutCommand::Rebind(topology) => {
                log::debug!(
                    "layout: rebinding to {} nodes, {} links",
                    topology.nodes.len(),
                    topology.links.len()
                );
                self.simulation.rebind(topology);
                true
            },
            LayoutCommand::BeginDrag { id } => self.simulation.begin_drag(id),
            LayoutCommand::DragTo { id, x, y } => self.simulation.drag_to(id, Point2D::new(*x, *y)),
            LayoutCommand::EndDrag { id } => self.simulation.end_drag(id),
            LayoutCommand::Reheat => {
                self.simulation.reheat();
                true
            },
            LayoutCommand::Shutdown => true,
        };
        if !applied {
            log::debug!("layout: ignoring {command:?} for unknown node");
        }
    }

    fn publish(&self) {
        self.positions_tx.send_replace(self.simulation.snapshot());
    }
}

/// Handle to a running layout worker. Dropping it closes the command queue,
/// which also stops the worker.
pub struct LayoutHandle {
    command_tx: mpsc::UnboundedSender<LayoutCommand>,
    positions_rx: watch::Receiver<PositionSnapshot>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl LayoutHandle {
    /// Queue a command without waiting. Returns `false` only if the worker
    /// is gone.
    pub fn send(&self, command: LayoutCommand) -> bool {
        match self.command_tx.send(command) {
            Ok(()) => true,
            Err(e) => {
                log::debug!("layout: command dropped ({e})");
                false
            },
        }
    }

    /// A receiver that observes every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<PositionSnapshot> {
        self.positions_rx.clone()
    }

    /// Most recently published positions.
    pub fn latest(&self) -> PositionSnapshot {
        self.positions_rx.borrow().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the worker and wait for it to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            log::warn!("Layout worker ended abnormally: {e}");
        }
    }
}

/// Spawn the worker on the current tokio runtime. `cancel` is typically a
/// child of the session's token so teardown stops layout too.
pub fn spawn_layout_worker(
    simulation: ForceSimulation,
    tick_interval: Duration,
    cancel: CancellationToken,
) -> LayoutHandle {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (positions_tx, positions_rx) = watch::channel(simulation.snapshot());
    let worker = LayoutWorker {
        simulation,
        command_rx,
        positions_tx,
        cancel: cancel.clone(),
        tick_interval,
    };
    let task = tokio::spawn(worker.run());
    LayoutHandle {
        command_tx,
        positions_rx,
        cancel,
        task,
    }
}
