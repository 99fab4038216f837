/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Force-directed layout for the thought graph.
//!
//! A velocity-Verlet simulation in the style of d3-force: link springs,
//! many-body charge, collision and centering. `alpha` is the simulation's
//! energy; it decays toward `alpha_target` every tick and the simulation goes
//! idle once it drops below `alpha_min`. Topology changes and drags re-arm it.
//!
//! Positions are ephemeral and keyed by thought id; they are never persisted.

use std::collections::HashMap;
use std::f32::consts::PI;

use euclid::default::{Point2D, Vector2D};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::graph::Graph;

pub mod worker;

pub use worker::{LayoutCommand, LayoutHandle, spawn_layout_worker};

const INITIAL_RADIUS: f32 = 10.0;
const MIN_CHARGE_DISTANCE_SQUARED: f32 = 1.0;
const JIGGLE_SEED: u64 = 0x5eed;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutParams {
    /// Rest length of each link spring.
    pub link_distance: f32,
    /// Many-body strength; negative repels.
    pub charge_strength: f32,
    /// Per-node collision radius.
    pub collide_radius: f32,
    pub collide_strength: f32,
    /// Viewport centre the layout is translated onto.
    pub center: Point2D<f32>,
    pub alpha_min: f32,
    pub alpha_decay: f32,
    pub velocity_decay: f32,
}

impl Default for LayoutParams {
    fn default() -> Self {
        let alpha_min = 0.001_f32;
        Self {
            link_distance: 140.0,
            charge_strength: -250.0,
            collide_radius: 40.0,
            collide_strength: 1.0,
            center: Point2D::new(640.0, 400.0),
            alpha_min,
            // Cools from 1 to alpha_min in about 300 ticks.
            alpha_decay: 1.0 - alpha_min.powf(1.0 / 300.0),
            velocity_decay: 0.4,
        }
    }
}

/// Node ids and id pairs the simulation is bound to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayoutTopology {
    pub nodes: Vec<String>,
    pub links: Vec<(String, String)>,
}

impl LayoutTopology {
    pub fn from_graph(graph: &Graph) -> Self {
        let nodes = graph.nodes().map(|(_, node)| node.id.clone()).collect();
        let links = graph
            .edges()
            .filter_map(|edge| {
                let source = graph.get_node(edge.source)?;
                let target = graph.get_node(edge.target)?;
                Some((source.id.clone(), target.id.clone()))
            })
            .collect();
        Self { nodes, links }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodePosition {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub pinned: bool,
}

/// Positions of every bound node after a tick, in topology order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionSnapshot {
    pub alpha: f32,
    pub nodes: Vec<NodePosition>,
}

impl PositionSnapshot {
    pub fn get(&self, id: &str) -> Option<&NodePosition> {
        self.nodes.iter().find(|node| node.id == id)
    }
}

#[derive(Debug, Clone)]
struct Body {
    id: String,
    position: Point2D<f32>,
    velocity: Vector2D<f32>,
    pin: Option<Point2D<f32>>,
}

#[derive(Debug, Clone, Copy)]
struct Spring {
    source: usize,
    target: usize,
    strength: f32,
    bias: f32,
}

pub struct ForceSimulation {
    params: LayoutParams,
    bodies: Vec<Body>,
    springs: Vec<Spring>,
    index_by_id: HashMap<String, usize>,
    alpha: f32,
    alpha_target: f32,
    running: bool,
    rng: StdRng,
}

impl ForceSimulation {
    pub fn new(params: LayoutParams) -> Self {
        Self {
            params,
            bodies: Vec::new(),
            springs: Vec::new(),
            index_by_id: HashMap::new(),
            alpha: 1.0,
            alpha_target: 0.0,
            running: true,
            rng: StdRng::seed_from_u64(JIGGLE_SEED),
        }
    }

    pub fn params(&self) -> &LayoutParams {
        &self.params
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn alpha_target(&self) -> f32 {
        self.alpha_target
    }

    /// Whether ticks still move nodes.
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn node_count(&self) -> usize {
        self.bodies.len()
    }

    /// Bind to a new node and link set. Known ids keep their position,
    /// velocity and pin; new ids spawn near the centre at rest. Links naming
    /// an unknown id, and self-links, exert no force.
    pub fn rebind(&mut self, topology: &LayoutTopology) {
        let mut previous: HashMap<String, Body> = self
            .bodies
            .drain(..)
            .map(|body| (body.id.clone(), body))
            .collect();

        self.index_by_id.clear();
        for (index, id) in topology.nodes.iter().enumerate() {
            if self.index_by_id.contains_key(id) {
                continue;
            }
            let body = previous.remove(id).unwrap_or_else(|| Body {
                id: id.clone(),
                position: spawn_position(self.params.center, index),
                velocity: Vector2D::zero(),
                pin: None,
            });
            self.index_by_id.insert(id.clone(), self.bodies.len());
            self.bodies.push(body);
        }

        let mut links = Vec::new();
        let mut link_count = vec![0_usize; self.bodies.len()];
        for (source, target) in &topology.links {
            let (Some(&s), Some(&t)) = (self.index_by_id.get(source), self.index_by_id.get(target))
            else {
                continue;
            };
            if s == t {
                continue;
            }
            link_count[s] += 1;
            link_count[t] += 1;
            links.push((s, t));
        }
        self.springs = links
            .into_iter()
            .map(|(source, target)| {
                let (cs, ct) = (link_count[source] as f32, link_count[target] as f32);
                Spring {
                    source,
                    target,
                    strength: 1.0 / cs.min(ct),
                    bias: cs / (cs + ct),
                }
            })
            .collect();

        self.reheat();
    }

    /// Inject full energy and resume ticking.
    pub fn reheat(&mut self) {
        self.alpha = 1.0;
        self.running = true;
    }

    /// Pin `id` where it is and keep the simulation warm while dragging.
    pub fn begin_drag(&mut self, id: &str) -> bool {
        let Some(&index) = self.index_by_id.get(id) else {
            return false;
        };
        let body = &mut self.bodies[index];
        body.pin = Some(body.position);
        self.alpha_target = 0.3;
        self.running = true;
        true
    }

    pub fn drag_to(&mut self, id: &str, to: Point2D<f32>) -> bool {
        let Some(&index) = self.index_by_id.get(id) else {
            return false;
        };
        self.bodies[index].pin = Some(to);
        true
    }

    /// Release `id` back into the simulation and let it cool.
    pub fn end_drag(&mut self, id: &str) -> bool {
        let Some(&index) = self.index_by_id.get(id) else {
            return false;
        };
        self.bodies[index].pin = None;
        self.alpha_target = 0.0;
        true
    }

    /// Advance one step. Returns `false` without moving anything once the
    /// simulation has cooled below `alpha_min`.
    pub fn step(&mut self) -> bool {
        if !self.running {
            return false;
        }
        self.tick();
        if self.alpha < self.params.alpha_min {
            self.running = false;
            log::debug!("layout: simulation cooled ({} nodes)", self.bodies.len());
        }
        true
    }

    fn tick(&mut self) {
        self.alpha += (self.alpha_target - self.alpha) * self.params.alpha_decay;

        self.apply_links();
        self.apply_charge();
        self.apply_centering();
        self.apply_collisions();

        let keep = 1.0 - self.params.velocity_decay;
        for body in &mut self.bodies {
            if let Some(pin) = body.pin {
                body.position = pin;
                body.velocity = Vector2D::zero();
            } else {
                body.velocity = body.velocity * keep;
                body.position += body.velocity;
            }
        }
    }

    fn apply_links(&mut self) {
        let alpha = self.alpha;
        let rest = self.params.link_distance;
        for spring in &self.springs {
            let source = &self.bodies[spring.source];
            let target = &self.bodies[spring.target];
            let mut delta = (target.position + target.velocity) - (source.position + source.velocity);
            if delta.x == 0.0 {
                delta.x = jiggle(&mut self.rng);
            }
            if delta.y == 0.0 {
                delta.y = jiggle(&mut self.rng);
            }
            let length = delta.length();
            let pull = delta * ((length - rest) / length * alpha * spring.strength);
            self.bodies[spring.target].velocity -= pull * spring.bias;
            self.bodies[spring.source].velocity += pull * (1.0 - spring.bias);
        }
    }

    fn apply_charge(&mut self) {
        let strength = self.params.charge_strength * self.alpha;
        if strength == 0.0 {
            return;
        }
        let count = self.bodies.len();
        let mut impulses = vec![Vector2D::zero(); count];
        for i in 0..count {
            for j in 0..count {
                if i == j {
                    continue;
                }
                let mut delta = self.bodies[j].position - self.bodies[i].position;
                if delta.x == 0.0 {
                    delta.x = jiggle(&mut self.rng);
                }
                if delta.y == 0.0 {
                    delta.y = jiggle(&mut self.rng);
                }
                let mut distance_squared = delta.square_length();
                if distance_squared < MIN_CHARGE_DISTANCE_SQUARED {
                    distance_squared = (MIN_CHARGE_DISTANCE_SQUARED * distance_squared).sqrt();
                }
                impulses[i] += delta * (strength / distance_squared);
            }
        }
        for (body, impulse) in self.bodies.iter_mut().zip(impulses) {
            body.velocity += impulse;
        }
    }

    fn apply_centering(&mut self) {
        if self.bodies.is_empty() {
            return;
        }
        let count = self.bodies.len() as f32;
        let sum = self
            .bodies
            .iter()
            .fold(Vector2D::zero(), |acc, body| acc + body.position.to_vector());
        let shift = sum / count - self.params.center.to_vector();
        for body in &mut self.bodies {
            body.position -= shift;
        }
    }

    fn apply_collisions(&mut self) {
        let radius = self.params.collide_radius;
        let strength = self.params.collide_strength;
        if radius <= 0.0 || strength == 0.0 {
            return;
        }
        let reach = radius + radius;
        let count = self.bodies.len();
        for i in 0..count {
            let projected = self.bodies[i].position + self.bodies[i].velocity;
            for j in (i + 1)..count {
                let other = &self.bodies[j];
                let mut delta = projected - (other.position + other.velocity);
                let mut distance_squared = delta.square_length();
                if distance_squared >= reach * reach {
                    continue;
                }
                if delta.x == 0.0 {
                    delta.x = jiggle(&mut self.rng);
                    distance_squared += delta.x * delta.x;
                }
                if delta.y == 0.0 {
                    delta.y = jiggle(&mut self.rng);
                    distance_squared += delta.y * delta.y;
                }
                let distance = distance_squared.sqrt();
                let push = delta * ((reach - distance) / distance * strength);
                // Equal radii split the correction evenly.
                self.bodies[i].velocity += push * 0.5;
                self.bodies[j].velocity -= push * 0.5;
            }
        }
    }

    pub fn snapshot(&self) -> PositionSnapshot {
        PositionSnapshot {
            alpha: self.alpha,
            nodes: self
                .bodies
                .iter()
                .map(|body| NodePosition {
                    id: body.id.clone(),
                    x: body.position.x,
                    y: body.position.y,
                    pinned: body.pin.is_some(),
                })
                .collect(),
        }
    }
}

/// Phyllotaxis spiral around `center`, one turn of the golden angle per index.
fn spawn_position(center: Point2D<f32>, index: usize) -> Point2D<f32> {
    let golden_angle = PI * (3.0 - 5.0_f32.sqrt());
    let radius = INITIAL_RADIUS * (0.5 + index as f32).sqrt();
    let angle = index as f32 * golden_angle;
    Point2D::new(
        center.x + radius * angle.cos(),
        center.y + radius * angle.sin(),
    )
}

fn jiggle(rng: &mut StdRng) -> f32 {
    (rng.r#gen::<f32>() - 0.5) * 1e-6
}
