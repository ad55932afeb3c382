//! # Flat Index (Brute-Force Exact Search)
//!
//! Scans every stored vector. Used for:
//! 1. Ground truth during calibration and recall testing (100% recall)
//! 2. Small collections where graph overhead isn't worth it

use std::collections::BinaryHeap;

use parking_lot::RwLock;
use rayon::prelude::*;

use kensei_core::error::{Error, Result};

use crate::index::IndexConfig;
use crate::store::{DistanceOracle, VectorStore};
use crate::traits::{AnnIndex, SearchResult};

/// Exact nearest-neighbor index
pub struct FlatIndex {
    config: IndexConfig,
    oracle: DistanceOracle,
    store: VectorStore,
    ids: RwLock<Vec<u64>>,
}

impl FlatIndex {
    pub fn new(config: IndexConfig) -> Self {
        let oracle = DistanceOracle::resolve(config.metric, config.encoding);
        let store = VectorStore::new(config.dimensions, config.encoding);
        Self {
            config,
            oracle,
            store,
            ids: RwLock::new(Vec::new()),
        }
    }

    pub fn insert(&self, id: u64, vector: &[f32]) -> Result<()> {
        self.store.push(vector)?;
        self.ids.write().push(id);
        Ok(())
    }

    fn search_internal(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        if query.len() != self.config.dimensions {
            return Err(Error::DimensionMismatch {
                expected: self.config.dimensions,
                got: query.len(),
            });
        }
        let reader = self.store.read();
        let ids = self.ids.read();
        let prepared = self.oracle.prepare(query);

        // Max-heap keeps the k smallest distances; worst on top
        let mut heap: BinaryHeap<SearchResult> = BinaryHeap::with_capacity(k + 1);
        for slot in 0..reader.len() as u32 {
            let distance = self.oracle.query_to(&prepared, &reader, slot);
            heap.push(SearchResult {
                id: ids[slot as usize],
                distance,
            });
            if heap.len() > k {
                heap.pop();
            }
        }

        let mut results = heap.into_vec();
        results.sort_unstable();
        Ok(results)
    }

    /// Exact top-k for a row-major batch of queries, row order preserved.
    /// The standard way to precompute ground truth for calibration.
    pub fn search_batch(&self, queries: &[f32], k: usize) -> Result<(Vec<u64>, Vec<f32>)> {
        let dim = self.config.dimensions;
        if dim == 0 || queries.len() % dim != 0 {
            return Err(Error::DimensionMismatch {
                expected: dim,
                got: queries.len(),
            });
        }
        let rows: Vec<Vec<SearchResult>> = queries
            .par_chunks_exact(dim)
            .map(|query| self.search_internal(query, k))
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
}

impl AnnIndex for FlatIndex {
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        self.search_internal(query, k)
    }

    fn len(&self) -> usize {
        self.ids.read().len()
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }
}
