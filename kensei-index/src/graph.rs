//! # Adjacency Storage
//!
//! The mutable graph structure: an arena of slot-indexed, degree-bounded
//! out-neighbor lists. Nodes are dense `u32` slot indices, never pointers, so
//! back-edge patching is a bounded array write with no ownership cycles.
//!
//! ## Locking
//! - One `RwLock` per slot: no two structural mutations on the same slot
//!   interleave, mutations of disjoint slots never block each other, and a
//!   list can never be observed half-written
//! - An outer `RwLock` guards the arena itself so slots can be added while
//!   searches hold a consistent view; it is write-locked only to resize

use parking_lot::{RwLock, RwLockReadGuard};

/// Result of attempting to append a single back-edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeInsert {
    Added,
    AlreadyPresent,
    /// Target list is at the degree bound; caller must re-prune
    Full,
}

/// Per-node bounded out-neighbor lists
#[derive(Debug)]
pub struct AdjacencyStore {
    max_degree: usize,
    slots: RwLock<Vec<RwLock<Vec<u32>>>>,
}

impl AdjacencyStore {
    pub fn new(num_nodes: usize, max_degree: usize) -> Self {
        let slots = (0..num_nodes)
            .map(|_| RwLock::new(Vec::with_capacity(max_degree)))
            .collect();
        Self {
            max_degree,
            slots: RwLock::new(slots),
        }
    }

    pub fn max_degree(&self) -> usize {
        self.max_degree
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Grow the arena to `new_len` slots with empty lists
    pub fn grow(&self, new_len: usize) {
        let mut slots = self.slots.write();
        while slots.len() < new_len {
            slots.push(RwLock::new(Vec::with_capacity(self.max_degree)));
        }
    }

    /// Drop all slots past `new_len`. Caller must ensure no surviving list
    /// references a dropped slot.
    pub fn truncate(&self, new_len: usize) {
        let mut slots = self.slots.write();
        slots.truncate(new_len);
    }

    /// Acquire a consistent view of the arena for one operation
    pub fn read(&self) -> GraphReader<'_> {
        GraphReader {
            max_degree: self.max_degree,
            slots: self.slots.read(),
        }
    }
}

/// A consistent view of the arena; slot lists remain individually lockable
pub struct GraphReader<'a> {
    max_degree: usize,
    slots: RwLockReadGuard<'a, Vec<RwLock<Vec<u32>>>>,
}

impl GraphReader<'_> {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn max_degree(&self) -> usize {
        self.max_degree
    }

    /// Read access to one slot's list
    #[inline]
    pub fn neighbors(&self, node: u32) -> RwLockReadGuard<'_, Vec<u32>> {
        self.slots[node as usize].read()
    }

    /// Owned copy of one slot's list
    pub fn clone_neighbors(&self, node: u32) -> Vec<u32> {
        self.slots[node as usize].read().clone()
    }

    pub fn degree(&self, node: u32) -> usize {
        self.slots[node as usize].read().len()
    }

    /// Replace one slot's list wholesale
    pub fn replace(&self, node: u32, mut list: Vec<u32>) {
        debug_assert!(list.len() <= self.max_degree);
        list.truncate(self.max_degree);
        *self.slots[node as usize].write() = list;
    }

    pub fn clear(&self, node: u32) {
        self.slots[node as usize].write().clear();
    }

    /// Append `to` to `from`'s list if there is room and it is not already
    /// present. The check and the append happen under one write lock.
    pub fn try_add_edge(&self, from: u32, to: u32) -> EdgeInsert {
        let mut list = self.slots[from as usize].write();
        if list.contains(&to) {
            return EdgeInsert::AlreadyPresent;
        }
        if list.len() >= self.max_degree {
            return EdgeInsert::Full;
        }
        list.push(to);
        EdgeInsert::Added
    }

    /// Largest out-degree currently in the arena
    pub fn max_out_degree(&self) -> usize {
        self.slots.iter().map(|s| s.read().len()).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_edge_respects_degree_bound() {
        let graph = AdjacencyStore::new(8, 3);
        let g = graph.read();
        assert_eq!(g.try_add_edge(0, 1), EdgeInsert::Added);
        assert_eq!(g.try_add_edge(0, 1), EdgeInsert::AlreadyPresent);
        assert_eq!(g.try_add_edge(0, 2), EdgeInsert::Added);
        assert_eq!(g.try_add_edge(0, 3), EdgeInsert::Added);
        assert_eq!(g.try_add_edge(0, 4), EdgeInsert::Full);
        assert_eq!(g.degree(0), 3);
    }

    #[test]
    fn test_replace_truncates_to_bound() {
        let graph = AdjacencyStore::new(4, 2);
        let g = graph.read();
        g.replace(1, vec![0, 2, 3]);
        assert_eq!(g.degree(1), 2);
        assert_eq!(*g.neighbors(1), vec![0, 2]);
    }

    #[test]
    fn test_grow_and_truncate() {
        let graph = AdjacencyStore::new(2, 4);
        graph.grow(5);
        assert_eq!(graph.len(), 5);
        graph.read().replace(4, vec![0]);
        graph.truncate(3);
        assert_eq!(graph.len(), 3);
    }
}
