/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Thought graph engine.
//!
//! Short text thoughts become nodes; edges appear on their own, from the
//! semantic similarity of embeddings. A force simulation lays the graph out
//! and the whole graph saves to and loads from a single snapshot slot.

pub mod app;
pub mod config;
pub mod graph;
pub mod layout;
pub mod persistence;
pub(crate) mod runtime;
pub mod services;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
