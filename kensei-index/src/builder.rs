//! # Graph Construction
//!
//! Drives greedy search + pruning over a set of nodes to produce a navigable
//! bounded-degree graph, including the back-edge repair that keeps the graph
//! reachable in both directions.
//!
//! ## Build Process
//! 1. Shuffle the node order and split it into batches
//! 2. Forward phase (parallel, read-only): greedy-search each node from the
//!    entry point, pool the search history with the node's current list,
//!    prune to a diverse neighbor set
//! 3. Apply phase: replace each batch node's list
//! 4. Reverse phase: add a back-edge to every chosen neighbor; targets at
//!    the degree bound overflow into a bucketed buffer and are re-pruned
//!
//! Two passes over all nodes are run at build time: a cheap `alpha = 1.0`
//! connectivity pass, then the configured `alpha`.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use kensei_core::error::{Error, Result};

use crate::graph::{AdjacencyStore, EdgeInsert};
use crate::prune::{prepare_pool, robust_prune};
use crate::search::{greedy_search, Neighbor, SearchBuffer, SearchParameters};
use crate::store::{DistanceOracle, VectorStore};

/// Nodes per synchronization batch during construction
const BUILD_BATCH_SIZE: usize = 512;

/// Slots covered by one backedge-overflow bucket
const BACKEDGE_BUCKET_SIZE: usize = 1000;

/// Parameters controlling graph construction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BuildParameters {
    /// Pruning aggressiveness; values above 1.0 favor longer edges
    pub alpha: f32,
    /// Maximum out-degree per node
    pub graph_max_degree: usize,
    /// Beam width of the build-time greedy search
    pub window_size: usize,
    /// Cap on the candidate pool handed to the pruner
    pub max_candidate_pool_size: usize,
    /// Degree that overflowed lists are re-pruned to (<= graph_max_degree)
    pub prune_to: usize,
    /// Pool candidates from the full search history instead of only the
    /// final buffer contents. Slightly better graphs for more search time.
    pub use_full_search_history: bool,
}

impl Default for BuildParameters {
    fn default() -> Self {
        Self {
            alpha: 1.2,
            graph_max_degree: 64,
            window_size: 128,
            max_candidate_pool_size: 750,
            prune_to: 64,
            use_full_search_history: true,
        }
    }
}

impl BuildParameters {
    pub fn validate(&self) -> Result<()> {
        if self.graph_max_degree == 0 {
            return Err(Error::Configuration {
                message: "graph_max_degree must be at least 1".to_string(),
            });
        }
        if self.window_size == 0 {
            return Err(Error::Configuration {
                message: "window_size must be at least 1".to_string(),
            });
        }
        if self.prune_to == 0 || self.prune_to > self.graph_max_degree {
            return Err(Error::Configuration {
                message: format!(
                    "prune_to ({}) must be in 1..=graph_max_degree ({})",
                    self.prune_to, self.graph_max_degree
                ),
            });
        }
        if !self.alpha.is_finite() || self.alpha <= 0.0 {
            return Err(Error::Configuration {
                message: format!("alpha ({}) must be a positive finite value", self.alpha),
            });
        }
        Ok(())
    }
}

/// Entry point selection: the vector closest to the centroid of all slots
/// accepted by `valid`. Ties go to the lower slot id.
pub fn find_medoid<F>(store: &VectorStore, valid: F) -> Option<u32>
where
    F: Fn(u32) -> bool,
{
    let reader = store.read();
    let dim = store.dimensions();
    let n = reader.len();

    let mut centroid = vec![0.0f64; dim];
    let mut scratch = Vec::with_capacity(dim);
    let mut count = 0usize;
    for slot in 0..n as u32 {
        if !valid(slot) {
            continue;
        }
        reader.copy_decoded(slot, &mut scratch);
        for (c, v) in centroid.iter_mut().zip(scratch.iter()) {
            *c += *v as f64;
        }
        count += 1;
    }
    if count == 0 {
        return None;
    }
    let centroid: Vec<f32> = centroid.iter().map(|c| (*c / count as f64) as f32).collect();

    let mut best: Option<(f32, u32)> = None;
    for slot in 0..n as u32 {
        if !valid(slot) {
            continue;
        }
        reader.copy_decoded(slot, &mut scratch);
        let dist = crate::simd::l2_distance_squared(&centroid, &scratch);
        if best.map_or(true, |(d, _)| dist < d) {
            best = Some((dist, slot));
        }
    }
    best.map(|(_, slot)| slot)
}

/// Overflow buffer for back-edges that would exceed the degree bound.
///
/// Coarse bucket locking: synchronized access per entry, parallel access
/// across buckets.
struct BackedgeBuffer {
    bucket_size: usize,
    buckets: Vec<Mutex<HashMap<u32, HashSet<u32>>>>,
}

impl BackedgeBuffer {
    fn new(num_nodes: usize, bucket_size: usize) -> Self {
        let num_buckets = num_nodes.div_ceil(bucket_size).max(1);
        Self {
            bucket_size,
            buckets: (0..num_buckets).map(|_| Mutex::new(HashMap::new())).collect(),
        }
    }

    fn add_edge(&self, src: u32, dst: u32) {
        let bucket = (src as usize / self.bucket_size).min(self.buckets.len() - 1);
        self.buckets[bucket]
            .lock()
            .entry(src)
            .or_default()
            .insert(dst);
    }
}

/// Drives search + prune + back-edge repair over a node range.
///
/// The graph and store must already hold every node being connected; the
/// builder only rewrites adjacency lists.
pub struct GraphBuilder<'a> {
    graph: &'a AdjacencyStore,
    store: &'a VectorStore,
    oracle: DistanceOracle,
    params: BuildParameters,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(
        graph: &'a AdjacencyStore,
        store: &'a VectorStore,
        oracle: DistanceOracle,
        params: BuildParameters,
    ) -> Result<Self> {
        params.validate()?;
        if graph.len() != store.len() {
            return Err(Error::Internal {
                message: format!(
                    "graph has {} slots but store has {}",
                    graph.len(),
                    store.len()
                ),
            });
        }
        Ok(Self {
            graph,
            store,
            oracle,
            params,
        })
    }

    /// One full pass over `node_ids`: generate forward edges, then repair
    /// back-edges, batch by batch. `alpha` governs the overflow re-pruning;
    /// forward-edge generation always uses the configured alpha, which
    /// yields better graphs on the cheap first pass.
    pub fn construct(&self, alpha: f32, entry_point: u32, node_ids: &[u32]) {
        let mut order: Vec<u32> = node_ids.to_vec();
        order.shuffle(&mut rand::thread_rng());

        let num_batches = order.len().div_ceil(BUILD_BATCH_SIZE).max(1);
        debug!(
            nodes = order.len(),
            batches = num_batches,
            alpha,
            "starting construction pass"
        );

        for (batch_id, batch) in order.chunks(BUILD_BATCH_SIZE).enumerate() {
            let updates = self.generate_neighbors(batch, entry_point);

            // Apply: disjoint slots, safe to write in parallel
            {
                let graph = self.graph.read();
                updates
                    .into_par_iter()
                    .for_each(|(node, list)| graph.replace(node, list));
            }

            self.add_reverse_edges(batch, alpha);

            if batch_id % 16 == 0 {
                debug!(batch = batch_id + 1, of = num_batches, "construction progress");
            }
        }
    }

    /// Forward phase: search + prune each batch node. Read-only over the
    /// graph, so the whole batch runs in parallel.
    fn generate_neighbors(&self, batch: &[u32], entry_point: u32) -> Vec<(u32, Vec<u32>)> {
        let search_params = SearchParameters {
            search_window_size: self.params.window_size,
            search_buffer_capacity: self.params.window_size,
            visited_set_enabled: true,
        };

        batch
            .par_iter()
            .map(|&node| {
                let graph = self.graph.read();
                let store = self.store.read();
                let mut buffer = SearchBuffer::new(&search_params);
                let mut history = Vec::new();
                let mut query_vec = Vec::new();
                store.copy_decoded(node, &mut query_vec);
                let query = self.oracle.prepare(&query_vec);

                greedy_search(
                    &graph,
                    &store,
                    self.oracle,
                    &query,
                    &[entry_point],
                    &mut buffer,
                    |_| true,
                    self.params
                        .use_full_search_history
                        .then_some(&mut history),
                );

                let mut pool: Vec<Neighbor> = if self.params.use_full_search_history {
                    history
                } else {
                    buffer.results().collect()
                };

                // The node's existing neighbors stay in contention
                let mut in_pool: HashSet<u32> = pool.iter().map(|n| n.id).collect();
                for &existing in graph.neighbors(node).iter() {
                    if in_pool.insert(existing) {
                        pool.push(Neighbor::new(
                            existing,
                            self.oracle.between(&store, node, existing),
                        ));
                    }
                }

                prepare_pool(&mut pool, node, self.params.max_candidate_pool_size);

                let mut list = Vec::new();
                robust_prune(
                    &store,
                    self.oracle,
                    node,
                    &pool,
                    self.params.alpha,
                    self.params.graph_max_degree,
                    &mut list,
                );
                (node, list)
            })
            .collect()
    }

    /// Reverse phase: point every chosen neighbor back at the batch node.
    /// Targets already at the degree bound are collected and re-pruned to
    /// `prune_to` from the union of their old list and the overflow.
    fn add_reverse_edges(&self, batch: &[u32], alpha: f32) {
        let overflow = BackedgeBuffer::new(self.graph.len(), BACKEDGE_BUCKET_SIZE);

        batch.par_iter().for_each(|&node| {
            let graph = self.graph.read();
            for target in graph.clone_neighbors(node) {
                match graph.try_add_edge(target, node) {
                    EdgeInsert::Added | EdgeInsert::AlreadyPresent => {}
                    EdgeInsert::Full => overflow.add_edge(target, node),
                }
            }
        });

        overflow.buckets.par_iter().for_each(|bucket| {
            let bucket = std::mem::take(&mut *bucket.lock());
            if bucket.is_empty() {
                return;
            }
            let graph = self.graph.read();
            let store = self.store.read();
            let mut pool = Vec::new();
            let mut list = Vec::new();
            for (src, extra) in bucket {
                pool.clear();
                for &candidate in extra.iter() {
                    pool.push(Neighbor::new(
                        candidate,
                        self.oracle.between(&store, src, candidate),
                    ));
                }
                for &candidate in graph.neighbors(src).iter() {
                    if !extra.contains(&candidate) {
                        pool.push(Neighbor::new(
                            candidate,
                            self.oracle.between(&store, src, candidate),
                        ));
                    }
                }
                prepare_pool(&mut pool, src, self.params.max_candidate_pool_size);
                robust_prune(
                    &store,
                    self.oracle,
                    src,
                    &pool,
                    alpha,
                    self.params.prune_to,
                    &mut list,
                );
                graph.replace(src, std::mem::take(&mut list));
            }
        });
    }
}
