//! # Neighbor Selection
//!
//! The pruning rule that turns a distance-ordered candidate pool into a
//! diverse, degree-bounded adjacency list. Greedily accept the closest
//! remaining candidate `c`, then discard every remaining `c'` that is
//! geometrically redundant: `alpha * d(c, c') <= d(node, c')`.
//!
//! `alpha == 1` is the minimal diversity rule; `alpha > 1` keeps longer
//! edges, which is what gives the graph its small-world hop counts.

use crate::search::Neighbor;
use crate::store::{DistanceOracle, StoreReader};

/// Normalize a candidate pool in place: drop the node itself, deduplicate by
/// id (keeping the closest occurrence), sort by `(distance, id)`, and cap at
/// `max_pool_size`.
pub fn prepare_pool(pool: &mut Vec<Neighbor>, node: u32, max_pool_size: usize) {
    pool.sort_unstable();
    let mut seen = std::collections::HashSet::with_capacity(pool.len());
    pool.retain(|candidate| candidate.id != node && seen.insert(candidate.id));
    pool.truncate(max_pool_size);
}

/// Select up to `degree_bound` diverse neighbors from a prepared pool.
///
/// `pool` must be sorted ascending by distance, free of duplicates, and must
/// not contain `node` itself (see [`prepare_pool`]). The output inherits
/// those properties: no duplicates, never the source node, at most
/// `degree_bound` entries. A pool smaller than the bound is accepted whole
/// (minus candidates discarded by the diversity rule).
pub fn robust_prune(
    store: &StoreReader<'_>,
    oracle: DistanceOracle,
    node: u32,
    pool: &[Neighbor],
    alpha: f32,
    degree_bound: usize,
    out: &mut Vec<u32>,
) {
    debug_assert!(pool.windows(2).all(|w| w[0] < w[1]));
    debug_assert!(pool.iter().all(|c| c.id != node));

    out.clear();
    if pool.is_empty() || degree_bound == 0 {
        return;
    }
    out.reserve(degree_bound.min(pool.len()));

    let mut pruned = vec![false; pool.len()];
    let mut start = 0;
    while out.len() < degree_bound && start < pool.len() {
        if pruned[start] {
            start += 1;
            continue;
        }
        let accepted = pool[start];
        pruned[start] = true;
        out.push(accepted.id);

        for t in start + 1..pool.len() {
            if pruned[t] {
                continue;
            }
            let d_to_accepted = oracle.between(store, accepted.id, pool[t].id);
            if alpha * d_to_accepted <= pool[t].distance {
                pruned[t] = true;
            }
        }
        start += 1;
    }
}
