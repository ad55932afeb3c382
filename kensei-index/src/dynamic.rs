//! # Dynamic Graph Index
//!
//! Insert, soft-delete, consolidate, and compact over a live graph, without
//! full rebuilds.
//!
//! ## Slot State Machine
//!
//! ```text
//! ┌──────┐   add    ┌──────┐   delete   ┌────────────┐
//! │ Free │ ───────▶ │ Live │ ─────────▶ │ Tombstoned │
//! └──────┘          └──────┘            └────────────┘
//!    ▲                                        │
//!    └────────────── compact ◀────────────────┘
//!         (only once no live edges remain)
//! ```
//!
//! Deletes are O(1) soft deletes: the slot stays in the graph and is
//! traversed by searches, but never returned. `consolidate` rewrites live
//! adjacency lists to splice out tombstoned targets; `compact` then reclaims
//! unreferenced slots and may remap node ids, which invalidates any cached
//! slot-keyed handle. Compaction takes `&mut self`, so the borrow checker is
//! the phase barrier the id-space change requires; everything else works on
//! `&self` under per-slot locks.

use std::collections::{HashMap, HashSet};
use std::io::{Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use parking_lot::RwLock;
use rayon::prelude::*;
use tracing::{debug, info};

use kensei_core::error::{Error, Result};

use crate::builder::{find_medoid, BuildParameters, GraphBuilder};
use crate::graph::AdjacencyStore;
use crate::index::{
    read_adjacency, read_build_params, read_encoding, read_metric, read_search_params,
    read_vectors, write_adjacency, write_build_params, write_search_params, write_vectors,
    IndexConfig,
};
use crate::prune::{prepare_pool, robust_prune};
use crate::search::{greedy_search, Neighbor, SearchBuffer, SearchParameters};
use crate::store::{DistanceOracle, VectorStore};
use crate::traits::{AnnIndex, SearchResult};

const DYNAMIC_MAGIC: &[u8; 8] = b"KNSDYNMG";
const DYNAMIC_VERSION: u32 = 1;

/// How many consecutive non-live targets consolidation follows when
/// splicing a deleted neighbor's out-edges into a live list
const SPLICE_HOP_LIMIT: usize = 4;

/// Lifecycle state of one slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Unallocated or reclaimed; unreachable from the entry point
    Free,
    /// Present and returnable from searches
    Live,
    /// Soft-deleted: structurally present, never returned
    Tombstoned,
}

impl SlotState {
    fn to_tag(self) -> u8 {
        match self {
            SlotState::Free => 0,
            SlotState::Live => 1,
            SlotState::Tombstoned => 2,
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(SlotState::Free),
            1 => Some(SlotState::Live),
            2 => Some(SlotState::Tombstoned),
            _ => None,
        }
    }
}

/// Bidirectional external <-> internal id mapping. Tracks live ids only.
#[derive(Debug, Default)]
struct IdMap {
    external_to_internal: HashMap<u64, u32>,
    internal_to_external: Vec<Option<u64>>,
}

impl IdMap {
    fn len(&self) -> usize {
        self.external_to_internal.len()
    }

    fn internal(&self, external: u64) -> Option<u32> {
        self.external_to_internal.get(&external).copied()
    }

    fn external(&self, internal: u32) -> Option<u64> {
        self.internal_to_external
            .get(internal as usize)
            .copied()
            .flatten()
    }

    fn insert(&mut self, external: u64, internal: u32) {
        let slot = internal as usize;
        if self.internal_to_external.len() <= slot {
            self.internal_to_external.resize(slot + 1, None);
        }
        debug_assert!(self.internal_to_external[slot].is_none());
        self.internal_to_external[slot] = Some(external);
        self.external_to_internal.insert(external, internal);
    }

    fn remove_external(&mut self, external: u64) -> Option<u32> {
        let internal = self.external_to_internal.remove(&external)?;
        self.internal_to_external[internal as usize] = None;
        Some(internal)
    }

    fn iter_external(&self) -> impl Iterator<Item = u64> + '_ {
        self.external_to_internal.keys().copied()
    }

    /// Rebuild the mapping for a compacted slot space. `new_to_old[new]`
    /// names the old slot now living at `new`.
    fn apply_compaction(&mut self, new_to_old: &[u32]) {
        let mut remapped = vec![None; new_to_old.len()];
        let mut forward = HashMap::with_capacity(self.external_to_internal.len());
        for (new_slot, &old_slot) in new_to_old.iter().enumerate() {
            if let Some(external) = self
                .internal_to_external
                .get(old_slot as usize)
                .copied()
                .flatten()
            {
                remapped[new_slot] = Some(external);
                forward.insert(external, new_slot as u32);
            }
        }
        self.internal_to_external = remapped;
        self.external_to_internal = forward;
    }
}

/// All per-slot bookkeeping that must stay mutually consistent
#[derive(Debug, Default)]
struct DynamicState {
    status: Vec<SlotState>,
    ids: IdMap,
    entry_point: u32,
}

/// Per-item report for a batch insert
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddOutcome {
    /// Number of vectors inserted
    pub added: usize,
    /// External ids rejected because they already exist (or repeat within
    /// the batch)
    pub rejected_duplicates: Vec<u64>,
}

/// Per-item report for a batch delete
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// Number of ids tombstoned
    pub deleted: usize,
    /// External ids that were not present
    pub unknown: Vec<u64>,
}

/// Mutable Vamana index with external-id translation and tombstoning
pub struct DynamicVamanaIndex {
    config: IndexConfig,
    build_params: BuildParameters,
    oracle: DistanceOracle,
    store: VectorStore,
    graph: AdjacencyStore,
    state: RwLock<DynamicState>,
    search_params: RwLock<SearchParameters>,
}

impl DynamicVamanaIndex {
    /// Create an empty dynamic index
    pub fn new(config: IndexConfig, build_params: BuildParameters) -> Result<Self> {
        config.validate()?;
        build_params.validate()?;
        Ok(Self {
            config,
            build_params,
            oracle: DistanceOracle::resolve(config.metric, config.encoding),
            store: VectorStore::new(config.dimensions, config.encoding),
            graph: AdjacencyStore::new(0, build_params.graph_max_degree),
            state: RwLock::new(DynamicState::default()),
            search_params: RwLock::new(SearchParameters::default()),
        })
    }

    /// Build a dynamic index over an initial collection in one shot
    pub fn build(
        config: IndexConfig,
        build_params: BuildParameters,
        ids: &[u64],
        vectors: &[f32],
    ) -> Result<Self> {
        let index = Self::new(config, build_params)?;
        let outcome = index.add(vectors, ids)?;
        if !outcome.rejected_duplicates.is_empty() {
            return Err(Error::Configuration {
                message: format!(
                    "duplicate external ids in build input: {:?}",
                    outcome.rejected_duplicates
                ),
            });
        }
        Ok(index)
    }

    pub fn config(&self) -> IndexConfig {
        self.config
    }

    pub fn build_parameters(&self) -> BuildParameters {
        self.build_params
    }

    pub fn search_parameters(&self) -> SearchParameters {
        *self.search_params.read()
    }

    pub fn set_search_parameters(&self, params: SearchParameters) -> Result<()> {
        params.validate()?;
        *self.search_params.write() = params;
        Ok(())
    }

    /// Number of live (non-deleted) vectors
    pub fn len(&self) -> usize {
        self.state.read().ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    /// O(1) check whether an external id is live in the index
    pub fn has_id(&self, external: u64) -> bool {
        self.state.read().ids.internal(external).is_some()
    }

    /// All live external ids, in unspecified order
    pub fn all_ids(&self) -> Vec<u64> {
        self.state.read().ids.iter_external().collect()
    }

    /// Decoded vector for a live external id
    pub fn get(&self, external: u64) -> Option<Vec<f32>> {
        let internal = self.state.read().ids.internal(external)?;
        self.store.get(internal)
    }

    /// Insert a row-major batch of vectors under the given external ids.
    ///
    /// Per-item failures (duplicate ids) are reported in the outcome and do
    /// not abort the batch; a dimensionality mismatch fails the whole call.
    pub fn add(&self, vectors: &[f32], external_ids: &[u64]) -> Result<AddOutcome> {
        let dim = self.config.dimensions;
        if vectors.len() != external_ids.len() * dim {
            return Err(Error::DimensionMismatch {
                expected: external_ids.len() * dim,
                got: vectors.len(),
            });
        }

        let mut outcome = AddOutcome::default();
        // (external id, row in the input batch) -> assigned slot
        let mut accepted: Vec<(u64, usize)> = Vec::with_capacity(external_ids.len());
        let slots: Vec<u32>;
        let entry_point: u32;
        {
            let mut state = self.state.write();

            let mut batch_seen = HashSet::with_capacity(external_ids.len());
            for (row, &external) in external_ids.iter().enumerate() {
                if state.ids.internal(external).is_some() || !batch_seen.insert(external) {
                    outcome.rejected_duplicates.push(external);
                } else {
                    accepted.push((external, row));
                }
            }
            if accepted.is_empty() {
                return Ok(outcome);
            }

            // Reuse reclaimed slots first, then grow
            let mut free: Vec<u32> = Vec::with_capacity(accepted.len());
            for (slot, &status) in state.status.iter().enumerate() {
                if status == SlotState::Free {
                    free.push(slot as u32);
                    if free.len() == accepted.len() {
                        break;
                    }
                }
            }
            if free.len() < accepted.len() {
                let needed = accepted.len() - free.len();
                let old_len = state.status.len();
                let new_len = old_len + needed;
                self.store.grow(new_len);
                self.graph.grow(new_len);
                state.status.resize(new_len, SlotState::Free);
                free.extend(old_len as u32..new_len as u32);
            }
            slots = free;

            let first_insert = state.ids.len() == 0;
            for (&(external, _), &slot) in accepted.iter().zip(slots.iter()) {
                state.ids.insert(external, slot);
            }
            if first_insert {
                state.entry_point = slots[0];
            }
            entry_point = state.entry_point;
        }

        // Attach outside the state lock: searches keep running and simply
        // treat the not-yet-Live slots as non-returnable.
        for (&(_, row), &slot) in accepted.iter().zip(slots.iter()) {
            self.store.set(slot, &vectors[row * dim..(row + 1) * dim])?;
        }
        {
            let graph = self.graph.read();
            for &slot in &slots {
                graph.clear(slot);
            }
        }

        let builder = GraphBuilder::new(&self.graph, &self.store, self.oracle, self.build_params)?;
        builder.construct(self.build_params.alpha, entry_point, &slots);

        {
            let mut state = self.state.write();
            for &slot in &slots {
                state.status[slot as usize] = SlotState::Live;
            }
        }

        outcome.added = accepted.len();
        debug!(
            added = outcome.added,
            rejected = outcome.rejected_duplicates.len(),
            "batch insert complete"
        );
        Ok(outcome)
    }

    /// Soft-delete a batch of external ids. O(1) per id; the graph is not
    /// touched. Unknown ids are reported, never fatal.
    pub fn delete(&self, external_ids: &[u64]) -> DeleteOutcome {
        let mut outcome = DeleteOutcome::default();
        let mut state = self.state.write();
        for &external in external_ids {
            match state.ids.remove_external(external) {
                Some(internal) => {
                    debug_assert_eq!(state.status[internal as usize], SlotState::Live);
                    state.status[internal as usize] = SlotState::Tombstoned;
                    outcome.deleted += 1;
                }
                None => outcome.unknown.push(external),
            }
        }
        outcome
    }

    /// Remove every live reference to a tombstoned slot by splicing in the
    /// tombstoned target's out-edges (following chains of non-live targets
    /// up to a bounded hop count) and re-pruning to the degree bound.
    /// Recomputes the entry point if it was deleted.
    ///
    /// Idempotent: running it again with no intervening mutation rewrites
    /// nothing. Returns the number of adjacency lists rewritten.
    pub fn consolidate(&self) -> Result<usize> {
        // Re-seed the entry point first so searches never start on a slot
        // that compaction might reclaim.
        {
            let mut state = self.state.write();
            let entry = state.entry_point as usize;
            let entry_live =
                entry < state.status.len() && state.status[entry] == SlotState::Live;
            if !entry_live {
                let status = &state.status;
                if let Some(medoid) = find_medoid(&self.store, |slot| {
                    status[slot as usize] == SlotState::Live
                }) {
                    debug!(new_entry = medoid, "replacing deleted entry point");
                    state.entry_point = medoid;
                }
            }
        }

        let status: Vec<SlotState> = self.state.read().status.clone();
        let graph = self.graph.read();
        let store = self.store.read();
        // Slots attached after the snapshot was taken read as non-live here;
        // their lists are not rewritten this round
        let is_live = |slot: u32| {
            status.get(slot as usize).copied() == Some(SlotState::Live)
        };

        // Phase 1 (parallel, read-only): plan replacement lists
        let updates: Vec<(u32, Vec<u32>)> = (0..status.len() as u32)
            .into_par_iter()
            .filter_map(|node| {
                if !is_live(node) {
                    return None;
                }
                {
                    let list = graph.neighbors(node);
                    if list.iter().all(|&target| is_live(target)) {
                        return None;
                    }
                }

                // Splice: live targets stay; non-live targets contribute
                // their own out-edges, chased through further non-live
                // nodes up to the hop limit
                let mut seen: HashSet<u32> = HashSet::new();
                seen.insert(node);
                let mut live_candidates: Vec<u32> = Vec::new();
                let mut stack: Vec<(u32, usize)> = graph
                    .neighbors(node)
                    .iter()
                    .map(|&target| (target, 0))
                    .collect();
                while let Some((target, hops)) = stack.pop() {
                    if !seen.insert(target) {
                        continue;
                    }
                    if is_live(target) {
                        live_candidates.push(target);
                    } else if hops < SPLICE_HOP_LIMIT {
                        for &next in graph.neighbors(target).iter() {
                            stack.push((next, hops + 1));
                        }
                    }
                }

                let mut pool: Vec<Neighbor> = live_candidates
                    .into_iter()
                    .map(|candidate| {
                        Neighbor::new(candidate, self.oracle.between(&store, node, candidate))
                    })
                    .collect();
                prepare_pool(&mut pool, node, self.build_params.max_candidate_pool_size);

                let mut list = Vec::new();
                robust_prune(
                    &store,
                    self.oracle,
                    node,
                    &pool,
                    self.build_params.alpha,
                    self.build_params.prune_to,
                    &mut list,
                );
                Some((node, list))
            })
            .collect();

        // Phase 2: commit. Disjoint slots, safe in parallel; a reader sees
        // each list either before or after its single replacement.
        let repaired = updates.len();
        updates
            .into_par_iter()
            .for_each(|(node, list)| graph.replace(node, list));

        info!(repaired, "consolidation complete");
        Ok(repaired)
    }

    /// Physically reclaim slots that no live list references: tombstones
    /// after a [`DynamicVamanaIndex::consolidate`], plus any free holes.
    /// Remaps NodeIds (invalidating stale slot-keyed handles), the id
    /// translation, and the entry point. Requires exclusive access: the id
    /// space changes, so no concurrent search or mutation may run.
    ///
    /// Returns the number of slots reclaimed.
    pub fn compact(&mut self, batch_size: usize) -> Result<usize> {
        let batch_size = batch_size.max(1);
        let state = self.state.get_mut();
        let num_slots = state.status.len();

        // Tombstoned slots still referenced by a live list must survive;
        // there are none after a consolidate, but compact stays safe
        // without one.
        let mut referenced: HashSet<u32> = HashSet::new();
        {
            let graph = self.graph.read();
            for slot in 0..num_slots as u32 {
                if state.status[slot as usize] != SlotState::Live {
                    continue;
                }
                for &target in graph.neighbors(slot).iter() {
                    if state.status[target as usize] != SlotState::Live {
                        referenced.insert(target);
                    }
                }
            }
        }

        let new_to_old: Vec<u32> = (0..num_slots as u32)
            .filter(|&slot| {
                state.status[slot as usize] == SlotState::Live || referenced.contains(&slot)
            })
            .collect();
        let reclaimed = num_slots - new_to_old.len();
        if reclaimed == 0 {
            return Ok(0);
        }

        let old_to_new: HashMap<u32, u32> = new_to_old
            .iter()
            .enumerate()
            .map(|(new_slot, &old_slot)| (old_slot, new_slot as u32))
            .collect();

        // Remap adjacency batch-wise. Kept slots only ever move down
        // (new <= old), and batches proceed in ascending order, so reads of
        // old slots always happen before those slots are overwritten.
        // Surviving tombstones may reference dropped slots; those edges are
        // filtered here.
        {
            let graph = self.graph.read();
            let mut batch_start = 0usize;
            while batch_start < new_to_old.len() {
                let batch_end = (batch_start + batch_size).min(new_to_old.len());
                let batch: Vec<(u32, Vec<u32>)> = new_to_old[batch_start..batch_end]
                    .par_iter()
                    .enumerate()
                    .map(|(offset, &old_slot)| {
                        let remapped: Vec<u32> = graph
                            .neighbors(old_slot)
                            .iter()
                            .filter_map(|target| old_to_new.get(target).copied())
                            .collect();
                        ((batch_start + offset) as u32, remapped)
                    })
                    .collect();
                for (new_slot, list) in batch {
                    graph.replace(new_slot, list);
                }
                batch_start = batch_end;
            }
        }
        self.graph.truncate(new_to_old.len());
        self.store.compact(&new_to_old);

        let new_status: Vec<SlotState> = new_to_old
            .iter()
            .map(|&old_slot| state.status[old_slot as usize])
            .collect();
        state.status = new_status;
        state.ids.apply_compaction(&new_to_old);

        let remapped_entry = old_to_new.get(&state.entry_point).copied();
        state.entry_point = match remapped_entry {
            Some(entry) => entry,
            None => {
                let status = &state.status;
                find_medoid(&self.store, |slot| {
                    status[slot as usize] == SlotState::Live
                })
                .unwrap_or(0)
            }
        };

        info!(reclaimed, live = state.ids.len(), "compaction complete");
        Ok(reclaimed)
    }

    fn check_k(&self, k: usize, params: &SearchParameters) -> Result<()> {
        if k == 0 {
            return Err(Error::Configuration {
                message: "k must be at least 1".to_string(),
            });
        }
        if k > params.search_buffer_capacity {
            return Err(Error::Configuration {
                message: format!(
                    "k ({}) exceeds search_buffer_capacity ({}); raise the capacity instead \
                     of truncating results",
                    k, params.search_buffer_capacity
                ),
            });
        }
        Ok(())
    }

    fn search_internal(
        &self,
        query: &[f32],
        k: usize,
        params: &SearchParameters,
    ) -> Result<Vec<SearchResult>> {
        if query.len() != self.config.dimensions {
            return Err(Error::DimensionMismatch {
                expected: self.config.dimensions,
                got: query.len(),
            });
        }
        self.check_k(k, params)?;

        let state = self.state.read();
        let graph = self.graph.read();
        let store = self.store.read();
        if store.is_empty() {
            return Ok(Vec::new());
        }

        let prepared = self.oracle.prepare(query);
        let mut buffer = SearchBuffer::new(params);
        greedy_search(
            &graph,
            &store,
            self.oracle,
            &prepared,
            &[state.entry_point],
            &mut buffer,
            |slot| state.status[slot as usize] == SlotState::Live,
            None,
        );

        Ok(buffer
            .results()
            .take(k)
            .filter_map(|n| {
                state.ids.external(n.id).map(|external| SearchResult {
                    id: external,
                    distance: n.distance,
                })
            })
            .collect())
    }

    /// Top-k search for one query; tombstoned nodes are traversed but never
    /// returned
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        let params = self.search_parameters();
        self.search_internal(query, k, &params)
    }

    /// Top-k search for a row-major query batch; rows follow input order
    /// and are padded with `u64::MAX` / `f32::INFINITY` when fewer than `k`
    /// live neighbors are reachable
    pub fn search_batch(&self, queries: &[f32], k: usize) -> Result<(Vec<u64>, Vec<f32>)> {
        let dim = self.config.dimensions;
        if queries.is_empty() || queries.len() % dim != 0 {
            return Err(Error::DimensionMismatch {
                expected: dim,
                got: queries.len(),
            });
        }
        let params = self.search_parameters();
        self.check_k(k, &params)?;

        let rows: Vec<Vec<SearchResult>> = queries
            .par_chunks_exact(dim)
            .map(|query| self.search_internal(query, k, &params))
            .collect::<Result<_>>()?;

        let mut ids = Vec::with_capacity(rows.len() * k);
        let mut distances = Vec::with_capacity(rows.len() * k);
        for row in rows {
            let found = row.len();
            for result in row {
                ids.push(result.id);
                distances.push(result.distance);
            }
            for _ in found..k {
                ids.push(u64::MAX);
                distances.push(f32::INFINITY);
            }
        }
        Ok((ids, distances))
    }

    /// Verify the structural invariants: status/graph/store sizes agree,
    /// every out-degree is within the bound, and (when `allow_tombstoned`
    /// is false, i.e. after a consolidate) no live list references a
    /// non-live slot.
    pub fn validate_graph(&self, allow_tombstoned: bool) -> Result<()> {
        let state = self.state.read();
        let graph = self.graph.read();
        let num_slots = state.status.len();
        if graph.len() != num_slots || self.store.len() != num_slots {
            return Err(Error::IndexCorruption {
                details: format!(
                    "size mismatch: {} status slots, {} graph slots, {} store slots",
                    num_slots,
                    graph.len(),
                    self.store.len()
                ),
            });
        }
        for slot in 0..num_slots as u32 {
            if state.status[slot as usize] != SlotState::Live {
                continue;
            }
            let list = graph.neighbors(slot);
            if list.len() > graph.max_degree() {
                return Err(Error::IndexCorruption {
                    details: format!("slot {} exceeds the degree bound", slot),
                });
            }
            for &target in list.iter() {
                if target as usize >= num_slots {
                    return Err(Error::IndexCorruption {
                        details: format!("slot {} has dangling edge to {}", slot, target),
                    });
                }
                let target_state = state.status[target as usize];
                let acceptable = target_state == SlotState::Live
                    || (allow_tombstoned && target_state != SlotState::Free);
                if !acceptable {
                    return Err(Error::IndexCorruption {
                        details: format!(
                            "slot {} references non-live slot {} ({:?})",
                            slot, target, target_state
                        ),
                    });
                }
            }
        }
        Ok(())
    }

    /// Owned copy of every adjacency list, for diagnostics and tests
    pub fn adjacency_lists(&self) -> Vec<Vec<u32>> {
        let graph = self.graph.read();
        (0..graph.len() as u32)
            .map(|slot| graph.clone_neighbors(slot))
            .collect()
    }

    /// Largest out-degree currently in the graph
    pub fn max_out_degree(&self) -> usize {
        self.graph.read().max_out_degree()
    }

    /// Snapshot the full dynamic state: configuration, parameters, slot
    /// states, id translation, adjacency lists, and vectors.
    pub fn save(&self, path: &Path) -> Result<()> {
        let state = self.state.read();
        let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);

        file.write_all(DYNAMIC_MAGIC)?;
        file.write_u32::<LittleEndian>(DYNAMIC_VERSION)?;
        file.write_u32::<LittleEndian>(self.config.dimensions as u32)?;
        file.write_u8(self.config.metric.to_tag())?;
        file.write_u8(self.config.encoding.to_tag())?;

        write_build_params(&mut file, &self.build_params)?;
        write_search_params(&mut file, &self.search_parameters())?;

        let num_slots = state.status.len();
        file.write_u64::<LittleEndian>(num_slots as u64)?;
        file.write_u32::<LittleEndian>(state.entry_point)?;

        for &status in &state.status {
            file.write_u8(status.to_tag())?;
        }

        file.write_u64::<LittleEndian>(state.ids.len() as u64)?;
        for (slot, external) in state.ids.internal_to_external.iter().enumerate() {
            if let Some(external) = external {
                file.write_u32::<LittleEndian>(slot as u32)?;
                file.write_u64::<LittleEndian>(*external)?;
            }
        }

        write_adjacency(&mut file, &self.graph)?;
        write_vectors(&mut file, &self.store)?;

        file.flush()?;
        Ok(())
    }

    /// Reload a snapshot written by [`DynamicVamanaIndex::save`]. Given the
    /// same vectors, search behavior is identical to the saved index.
    pub fn load(path: &Path) -> Result<Self> {
        let mut file = std::io::BufReader::new(std::fs::File::open(path)?);

        let mut magic = [0u8; 8];
        file.read_exact(&mut magic)?;
        if &magic != DYNAMIC_MAGIC {
            return Err(Error::IndexCorruption {
                details: "bad dynamic snapshot magic".to_string(),
            });
        }
        let version = file.read_u32::<LittleEndian>()?;
        if version != DYNAMIC_VERSION {
            return Err(Error::IndexCorruption {
                details: format!("unsupported dynamic snapshot version {}", version),
            });
        }

        let dimensions = file.read_u32::<LittleEndian>()? as usize;
        let metric = read_metric(&mut file)?;
        let encoding = read_encoding(&mut file)?;
        let config = IndexConfig {
            dimensions,
            metric,
            encoding,
        };

        let build_params = read_build_params(&mut file)?;
        let search_params = read_search_params(&mut file)?;

        let num_slots = file.read_u64::<LittleEndian>()? as usize;
        let entry_point = file.read_u32::<LittleEndian>()?;

        let mut status = Vec::with_capacity(num_slots);
        for _ in 0..num_slots {
            let tag = file.read_u8()?;
            status.push(SlotState::from_tag(tag).ok_or_else(|| Error::IndexCorruption {
                details: format!("unknown slot state tag {}", tag),
            })?);
        }

        let mut ids = IdMap::default();
        let num_ids = file.read_u64::<LittleEndian>()? as usize;
        for _ in 0..num_ids {
            let slot = file.read_u32::<LittleEndian>()?;
            let external = file.read_u64::<LittleEndian>()?;
            if slot as usize >= num_slots || status[slot as usize] != SlotState::Live {
                return Err(Error::IndexCorruption {
                    details: format!("id mapping references non-live slot {}", slot),
                });
            }
            ids.insert(external, slot);
        }

        let graph = read_adjacency(&mut file, num_slots, build_params.graph_max_degree)?;
        let store = read_vectors(&mut file, num_slots, dimensions, encoding)?;

        Ok(Self {
            config,
            build_params,
            oracle: DistanceOracle::resolve(metric, encoding),
            store,
            graph,
            state: RwLock::new(DynamicState {
                status,
                ids,
                entry_point,
            }),
            search_params: RwLock::new(search_params),
        })
    }
}

impl AnnIndex for DynamicVamanaIndex {
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        DynamicVamanaIndex::search(self, query, k)
    }

    fn len(&self) -> usize {
        DynamicVamanaIndex::len(self)
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }
}
