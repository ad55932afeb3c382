//! # Greedy Graph Search
//!
//! The traversal primitive shared by queries, graph construction, and the
//! dynamic attach path: seed a bounded candidate buffer from the entry
//! point(s), repeatedly expand the closest unexpanded candidate, and stop
//! when every in-window candidate has been expanded.
//!
//! Determinism: candidates are ordered by `(distance, id)` with a total
//! order on the distance (`f32::total_cmp`), so results are reproducible for
//! a fixed graph and parameter set regardless of thread scheduling.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use kensei_core::error::{Error, Result};

use crate::graph::GraphReader;
use crate::store::{DistanceOracle, PreparedQuery, StoreReader};

/// Runtime parameters controlling the accuracy and cost of one search.
///
/// `search_window_size` bounds how many candidates are eligible for
/// expansion; `search_buffer_capacity` bounds how many are retained. A
/// capacity above the window keeps extra tail candidates without making the
/// traversal longer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParameters {
    pub search_window_size: usize,
    pub search_buffer_capacity: usize,
    /// Track every scored id so repeat edges skip the distance computation.
    /// Pays off in high-window or high-degree regimes.
    pub visited_set_enabled: bool,
}

impl Default for SearchParameters {
    fn default() -> Self {
        Self::uniform(32)
    }
}

impl SearchParameters {
    /// Window and capacity set to the same value
    pub fn uniform(window: usize) -> Self {
        Self {
            search_window_size: window,
            search_buffer_capacity: window,
            visited_set_enabled: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.search_window_size == 0 {
            return Err(Error::Configuration {
                message: "search_window_size must be at least 1".to_string(),
            });
        }
        if self.search_buffer_capacity < self.search_window_size {
            return Err(Error::Configuration {
                message: format!(
                    "search_buffer_capacity ({}) must be >= search_window_size ({})",
                    self.search_buffer_capacity, self.search_window_size
                ),
            });
        }
        Ok(())
    }
}

/// An internal candidate: slot index plus its distance to the query
#[derive(Debug, Clone, Copy)]
pub struct Neighbor {
    pub id: u32,
    pub distance: f32,
}

impl Neighbor {
    pub fn new(id: u32, distance: f32) -> Self {
        Self { id, distance }
    }
}

impl PartialEq for Neighbor {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for Neighbor {}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Ties broken by id for reproducibility
        self.distance
            .total_cmp(&other.distance)
            .then(self.id.cmp(&other.id))
    }
}

#[derive(Debug, Clone, Copy)]
struct BufferSlot {
    neighbor: Neighbor,
    expanded: bool,
    /// Cleared for candidates that must be traversed but never returned
    /// (tombstoned nodes in the dynamic index)
    returnable: bool,
}

/// Bounded, distance-ordered candidate buffer for one greedy search.
///
/// At most `capacity` candidates are retained; only the first `window`
/// entries are eligible for expansion. The buffer is reusable across
/// searches via [`SearchBuffer::clear`].
pub struct SearchBuffer {
    window: usize,
    capacity: usize,
    slots: Vec<BufferSlot>,
    visited: Option<HashSet<u32>>,
}

impl SearchBuffer {
    pub fn new(params: &SearchParameters) -> Self {
        Self {
            window: params.search_window_size,
            capacity: params.search_buffer_capacity,
            slots: Vec::with_capacity(params.search_buffer_capacity + 1),
            visited: params.visited_set_enabled.then(HashSet::new),
        }
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        if let Some(visited) = self.visited.as_mut() {
            visited.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Record `id` as scored. Returns `false` when the visited set already
    /// contains it, i.e. the caller should skip the distance computation.
    /// Always `true` when the visited set is disabled; duplicate inserts are
    /// then caught by the exact-match check in [`SearchBuffer::insert`].
    #[inline]
    fn mark_visited(&mut self, id: u32) -> bool {
        match self.visited.as_mut() {
            Some(visited) => visited.insert(id),
            None => true,
        }
    }

    /// Insert a candidate, keeping the buffer sorted and evicting the worst
    /// entry beyond capacity.
    fn insert(&mut self, neighbor: Neighbor, returnable: bool) {
        let idx = match self
            .slots
            .binary_search_by(|slot| slot.neighbor.cmp(&neighbor))
        {
            // Exact (distance, id) match: already present
            Ok(_) => return,
            Err(idx) => idx,
        };
        if idx >= self.capacity {
            return;
        }
        self.slots.insert(
            idx,
            BufferSlot {
                neighbor,
                expanded: false,
                returnable,
            },
        );
        self.slots.truncate(self.capacity);
    }

    /// Closest unexpanded candidate within the window, if any
    fn pop_unexpanded(&mut self) -> Option<Neighbor> {
        let frontier = self.window.min(self.slots.len());
        for slot in self.slots[..frontier].iter_mut() {
            if !slot.expanded {
                slot.expanded = true;
                return Some(slot.neighbor);
            }
        }
        None
    }

    /// Ranked returnable candidates, closest first
    pub fn results(&self) -> impl Iterator<Item = Neighbor> + '_ {
        self.slots
            .iter()
            .filter(|slot| slot.returnable)
            .map(|slot| slot.neighbor)
    }
}

/// Greedy search over the graph from the given entry points.
///
/// Read-only over graph and store; all state lives in `buffer`. The
/// `returnable` predicate marks candidates that may appear in results
/// (everything else is traversed but filtered). When `history` is provided,
/// every scored candidate is appended to it, giving the builder the full
/// search history as a pruning pool.
///
/// Out-of-range neighbor ids are a structural invariant violation: a hard
/// assertion in debug builds; skipped in release so a query degrades instead
/// of aborting.
pub fn greedy_search<F>(
    graph: &GraphReader<'_>,
    store: &StoreReader<'_>,
    oracle: DistanceOracle,
    query: &PreparedQuery,
    entry_points: &[u32],
    buffer: &mut SearchBuffer,
    returnable: F,
    mut history: Option<&mut Vec<Neighbor>>,
) where
    F: Fn(u32) -> bool,
{
    buffer.clear();
    let num_nodes = store.len().min(graph.len());

    for &entry in entry_points {
        if (entry as usize) >= num_nodes {
            debug_assert!(false, "entry point {} out of range", entry);
            continue;
        }
        if !buffer.mark_visited(entry) {
            continue;
        }
        let distance = oracle.query_to(query, store, entry);
        let neighbor = Neighbor::new(entry, distance);
        if let Some(history) = history.as_mut() {
            history.push(neighbor);
        }
        buffer.insert(neighbor, returnable(entry));
    }

    while let Some(current) = buffer.pop_unexpanded() {
        let adjacent = graph.neighbors(current.id);
        for &next in adjacent.iter() {
            if (next as usize) >= num_nodes {
                debug_assert!(false, "dangling edge {} -> {}", current.id, next);
                continue;
            }
            if !buffer.mark_visited(next) {
                continue;
            }
            let distance = oracle.query_to(query, store, next);
            let neighbor = Neighbor::new(next, distance);
            if let Some(history) = history.as_mut() {
                history.push(neighbor);
            }
            buffer.insert(neighbor, returnable(next));
        }
    }
}
