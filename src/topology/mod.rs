//! Round-indexed network topology
//!
//! Each reporting round gets its own undirected graph of motes. Rounds are
//! created lazily on the first neighbour report that names them and only
//! grow from parsed input; edges are removed solely through the explicit
//! [`TopologyTracker::remove_edge`] operation.
//!
//! # Main Types
//!
//! - [`RoundTopology`] - Vertices and canonical edges for one round
//! - [`TopologyHistory`] - Round number to topology, with optional retention
//! - [`TopologyTracker`] - Thread-safe owner that notifies [`TopologyListener`]s
//!
//! Snapshots are shared, not copied. The tracker hands out
//! `Arc<TopologyHistory>` and each round sits behind its own `Arc`, so a
//! report clones at most the round index and the one round it touches, and
//! only while an older snapshot is still held somewhere.

use crate::types::{NodeId, NodeIdPair};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

/// Separator in canonical edge keys
pub const EDGE_SEPARATOR: &str = " <-> ";

/// Order-independent key for the edge between two motes
pub fn edge_key(a: &NodeId, b: &NodeId) -> String {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    format!("{}{}{}", low, EDGE_SEPARATOR, high)
}

/// An undirected link, endpoints stored in canonical order
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Edge {
    pub low: NodeId,
    pub high: NodeId,
}

impl Edge {
    /// `None` for a self-loop
    pub fn new(a: NodeId, b: NodeId) -> Option<Self> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Some(Self { low: a, high: b }),
            std::cmp::Ordering::Greater => Some(Self { low: b, high: a }),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn key(&self) -> String {
        edge_key(&self.low, &self.high)
    }
}

/// Undirected graph for one round
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundTopology {
    vertices: BTreeSet<NodeId>,
    edges: BTreeMap<String, Edge>,
}

impl RoundTopology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an edge and both endpoints. Returns `false` for a self-loop or a known edge.
    pub fn add_edge(&mut self, a: &NodeId, b: &NodeId) -> bool {
        let Some(edge) = Edge::new(a.clone(), b.clone()) else {
            return false;
        };

        self.vertices.insert(edge.low.clone());
        self.vertices.insert(edge.high.clone());

        let key = edge.key();
        if self.edges.contains_key(&key) {
            return false;
        }
        self.edges.insert(key, edge);
        true
    }

    /// Remove an edge, keeping its endpoints. Returns whether it existed.
    pub fn remove_edge(&mut self, a: &NodeId, b: &NodeId) -> bool {
        self.edges.remove(&edge_key(a, b)).is_some()
    }

    pub fn contains_vertex(&self, node: &NodeId) -> bool {
        self.vertices.contains(node)
    }

    pub fn contains_edge(&self, a: &NodeId, b: &NodeId) -> bool {
        self.edges.contains_key(&edge_key(a, b))
    }

    pub fn vertices(&self) -> impl Iterator<Item = &NodeId> {
        self.vertices.iter()
    }

    /// Edges in key order
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Motes sharing an edge with `node`
    pub fn neighbours<'a>(&'a self, node: &'a NodeId) -> impl Iterator<Item = &'a NodeId> + 'a {
        self.edges.values().filter_map(move |e| {
            if &e.low == node {
                Some(&e.high)
            } else if &e.high == node {
                Some(&e.low)
            } else {
                None
            }
        })
    }
}

/// Topology of every retained round
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopologyHistory {
    rounds: BTreeMap<u32, Arc<RoundTopology>>,
    max_rounds: Option<usize>,
}

impl TopologyHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `max_rounds` rounds, evicting the lowest round numbers
    pub fn with_retention(max_rounds: Option<usize>) -> Self {
        Self {
            rounds: BTreeMap::new(),
            max_rounds,
        }
    }

    pub fn round(&self, round: u32) -> Option<&RoundTopology> {
        self.rounds.get(&round).map(Arc::as_ref)
    }

    /// Round numbers in ascending order
    pub fn round_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.rounds.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &RoundTopology)> {
        self.rounds.iter().map(|(r, t)| (*r, t.as_ref()))
    }

    /// Highest round number seen
    pub fn latest_round(&self) -> Option<u32> {
        self.rounds.keys().next_back().copied()
    }

    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }

    /// Add every pair to `round`, creating it if needed. Returns the number of new edges.
    pub fn apply(&mut self, round: u32, pairs: &[NodeIdPair]) -> usize {
        let topology = self.rounds.entry(round).or_default();
        let mut added = 0;
        for pair in pairs {
            if pair.left == pair.right {
                tracing::warn!("Ignoring self-loop on {} in round {}", pair.left, round);
                continue;
            }
            if topology.contains_edge(&pair.left, &pair.right) {
                continue;
            }
            Arc::make_mut(topology).add_edge(&pair.left, &pair.right);
            added += 1;
        }
        self.evict();
        added
    }

    pub fn remove_edge(&mut self, round: u32, a: &NodeId, b: &NodeId) -> bool {
        self.rounds
            .get_mut(&round)
            .is_some_and(|t| t.contains_edge(a, b) && Arc::make_mut(t).remove_edge(a, b))
    }

    fn evict(&mut self) {
        let Some(max) = self.max_rounds else {
            return;
        };
        while self.rounds.len() > max.max(1) {
            if let Some((round, _)) = self.rounds.pop_first() {
                tracing::debug!("Evicted topology for round {}", round);
            }
        }
    }
}

/// Receives the cumulative history after every change
pub trait TopologyListener: Send + Sync {
    fn topology_updated(&self, history: &Arc<TopologyHistory>);
}

impl<F> TopologyListener for F
where
    F: Fn(&Arc<TopologyHistory>) + Send + Sync,
{
    fn topology_updated(&self, history: &Arc<TopologyHistory>) {
        self(history)
    }
}

/// Owns the topology history and folds neighbour reports into it.
///
/// Listeners run on the caller's thread after the history lock is released,
/// with a snapshot taken under the lock, so they may call back into the
/// tracker. The history is copy-on-write: mutations go through
/// [`Arc::make_mut`], which leaves snapshots already handed out untouched.
#[derive(Default)]
pub struct TopologyTracker {
    history: Mutex<Arc<TopologyHistory>>,
    listeners: Mutex<Vec<Arc<dyn TopologyListener>>>,
}

impl TopologyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(max_rounds: Option<usize>) -> Self {
        Self {
            history: Mutex::new(Arc::new(TopologyHistory::with_retention(max_rounds))),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn TopologyListener>) {
        crate::lock(&self.listeners).push(listener);
    }

    /// Fold one round's neighbour report into the history and notify listeners
    pub fn update(&self, round: u32, pairs: &[NodeIdPair]) {
        let snapshot = {
            let mut history = crate::lock(&self.history);
            let added = Arc::make_mut(&mut *history).apply(round, pairs);
            tracing::debug!(
                "Round {}: {} pairs reported, {} new edges",
                round,
                pairs.len(),
                added
            );
            Arc::clone(&*history)
        };
        self.notify(&snapshot);
    }

    /// Explicitly retract an edge. Parsing never calls this.
    pub fn remove_edge(&self, round: u32, a: &NodeId, b: &NodeId) -> bool {
        let (removed, snapshot) = {
            let mut history = crate::lock(&self.history);
            let removed = Arc::make_mut(&mut *history).remove_edge(round, a, b);
            (removed, Arc::clone(&*history))
        };
        if removed {
            self.notify(&snapshot);
        }
        removed
    }

    /// Shared handle to the current history
    pub fn snapshot(&self) -> Arc<TopologyHistory> {
        Arc::clone(&*crate::lock(&self.history))
    }

    /// Copy of one round's topology
    pub fn round(&self, round: u32) -> Option<RoundTopology> {
        crate::lock(&self.history).round(round).cloned()
    }

    fn notify(&self, snapshot: &Arc<TopologyHistory>) {
        let listeners = crate::lock(&self.listeners).clone();
        for listener in listeners {
            listener.topology_updated(snapshot);
        }
    }
}
