//! # Static Graph Index
//!
//! The immutable Vamana index: built once over a fixed vector collection,
//! then searched concurrently from any number of threads. For insert and
//! delete support see [`crate::dynamic`].

use std::io::{Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use parking_lot::RwLock;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use kensei_core::error::{Error, Result};

use crate::builder::{find_medoid, BuildParameters, GraphBuilder};
use crate::calibrate::{recall_at_k, run_calibration, CalibrationOutcome, CalibrationParameters};
use crate::graph::AdjacencyStore;
use crate::search::{greedy_search, Neighbor, SearchBuffer, SearchParameters};
use crate::simd::DistanceMetric;
use crate::store::{DistanceOracle, VectorEncoding, VectorStore};
use crate::traits::{AnnIndex, SearchResult};

const INDEX_MAGIC: &[u8; 8] = b"KNSVAMAN";
const INDEX_VERSION: u32 = 1;

/// Identity of an index: what the vectors look like and how they compare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
    pub dimensions: usize,
    pub metric: DistanceMetric,
    pub encoding: VectorEncoding,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dimensions: 768,
            metric: DistanceMetric::L2,
            encoding: VectorEncoding::F32,
        }
    }
}

impl IndexConfig {
    pub fn validate(&self) -> Result<()> {
        if self.dimensions == 0 {
            return Err(Error::Configuration {
                message: "dimensions must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Immutable Vamana graph index
#[derive(Debug)]
pub struct VamanaIndex {
    config: IndexConfig,
    build_params: BuildParameters,
    oracle: DistanceOracle,
    store: VectorStore,
    graph: AdjacencyStore,
    /// Slot index -> external id
    ids: Vec<u64>,
    entry_point: u32,
    search_params: RwLock<SearchParameters>,
}

impl VamanaIndex {
    /// Build an index over `vectors` (row-major, `ids.len()` rows).
    pub fn build(
        config: IndexConfig,
        build_params: BuildParameters,
        ids: &[u64],
        vectors: &[f32],
    ) -> Result<Self> {
        config.validate()?;
        build_params.validate()?;
        if ids.is_empty() {
            return Err(Error::Configuration {
                message: "cannot build an index over zero vectors".to_string(),
            });
        }
        if vectors.len() != ids.len() * config.dimensions {
            return Err(Error::DimensionMismatch {
                expected: ids.len() * config.dimensions,
                got: vectors.len(),
            });
        }
        {
            let mut seen = std::collections::HashSet::with_capacity(ids.len());
            for &id in ids {
                if !seen.insert(id) {
                    return Err(Error::Configuration {
                        message: format!("duplicate external id {} in build input", id),
                    });
                }
            }
        }

        let store = VectorStore::from_vectors(config.dimensions, config.encoding, vectors)?;
        let graph = AdjacencyStore::new(ids.len(), build_params.graph_max_degree);
        let oracle = DistanceOracle::resolve(config.metric, config.encoding);

        let entry_point = find_medoid(&store, |_| true).ok_or_else(|| Error::Internal {
            message: "no entry point for an empty store".to_string(),
        })?;

        info!(
            vectors = ids.len(),
            dimensions = config.dimensions,
            max_degree = build_params.graph_max_degree,
            "building graph index"
        );
        let builder = GraphBuilder::new(&graph, &store, oracle, build_params)?;
        let nodes: Vec<u32> = (0..ids.len() as u32).collect();
        // Cheap connectivity pass, then the configured alpha
        builder.construct(1.0, entry_point, &nodes);
        builder.construct(build_params.alpha, entry_point, &nodes);

        Ok(Self {
            config,
            build_params,
            oracle,
            store,
            graph,
            ids: ids.to_vec(),
            entry_point,
            search_params: RwLock::new(SearchParameters::default()),
        })
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

    /// Largest out-degree currently in the graph
    pub fn max_out_degree(&self) -> usize {
        self.graph.read().max_out_degree()
    }

    fn check_query_shape(&self, queries: &[f32]) -> Result<usize> {
        let dim = self.config.dimensions;
        if queries.is_empty() || queries.len() % dim != 0 {
            return Err(Error::DimensionMismatch {
                expected: dim,
                got: queries.len(),
            });
        }
        Ok(queries.len() / dim)
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

    fn search_one(&self, query: &[f32], k: usize, params: &SearchParameters) -> Vec<Neighbor> {
        let graph = self.graph.read();
        let store = self.store.read();
        let prepared = self.oracle.prepare(query);
        let mut buffer = SearchBuffer::new(params);
        greedy_search(
            &graph,
            &store,
            self.oracle,
            &prepared,
            &[self.entry_point],
            &mut buffer,
            |_| true,
            None,
        );
        buffer.results().take(k).collect()
    }

    /// Top-k search for one query
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        let params = self.search_parameters();
        self.search_with(query, k, &params)
    }

    fn search_with(
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
        Ok(self
            .search_one(query, k, params)
            .into_iter()
            .map(|n| SearchResult {
                id: self.ids[n.id as usize],
                distance: n.distance,
            })
            .collect())
    }

    /// Top-k search for a row-major query batch. Output rows are `k` wide
    /// and follow the input order; rows with fewer than `k` reachable
    /// neighbors are padded with `u64::MAX` / `f32::INFINITY`.
    pub fn search_batch(&self, queries: &[f32], k: usize) -> Result<(Vec<u64>, Vec<f32>)> {
        let params = self.search_parameters();
        self.search_batch_with(queries, k, &params)
    }

    fn search_batch_with(
        &self,
        queries: &[f32],
        k: usize,
        params: &SearchParameters,
    ) -> Result<(Vec<u64>, Vec<f32>)> {
        let rows = self.check_query_shape(queries)?;
        self.check_k(k, params)?;
        let dim = self.config.dimensions;

        let per_row: Vec<Vec<Neighbor>> = queries
            .par_chunks_exact(dim)
            .map(|query| self.search_one(query, k, params))
            .collect();

        let mut ids = Vec::with_capacity(rows * k);
        let mut distances = Vec::with_capacity(rows * k);
        for row in per_row {
            let found = row.len();
            for neighbor in row {
                ids.push(self.ids[neighbor.id as usize]);
                distances.push(neighbor.distance);
            }
            for _ in found..k {
                ids.push(u64::MAX);
                distances.push(f32::INFINITY);
            }
        }
        Ok((ids, distances))
    }

    /// Tune search parameters against labeled validation data until
    /// `target_recall` is met or the probe budget runs out. The best
    /// parameters found are applied to the index and returned either way;
    /// check [`CalibrationOutcome::target_met`].
    ///
    /// `groundtruth_ids` is row-major with one row per query; rows may be
    /// wider than `k`, in which case only the first `k` entries count.
    pub fn calibrate(
        &self,
        queries: &[f32],
        groundtruth_ids: &[u64],
        k: usize,
        target_recall: f32,
        calibration: &CalibrationParameters,
    ) -> Result<CalibrationOutcome> {
        let rows = self.check_query_shape(queries)?;
        if rows == 0 || groundtruth_ids.len() % rows != 0 {
            return Err(Error::Configuration {
                message: format!(
                    "groundtruth size ({}) is not a multiple of the query count ({})",
                    groundtruth_ids.len(),
                    rows
                ),
            });
        }
        let gt_width = groundtruth_ids.len() / rows;
        if gt_width < k {
            return Err(Error::Configuration {
                message: format!(
                    "groundtruth rows ({} wide) are narrower than k ({})",
                    gt_width, k
                ),
            });
        }

        let outcome = run_calibration(calibration, k, target_recall, |params| {
            let (result_ids, _) = self.search_batch_with(queries, k, params)?;
            Ok(recall_at_k(&result_ids, groundtruth_ids, rows, k, gt_width))
        })?;

        info!(
            window = outcome.parameters.search_window_size,
            recall = outcome.achieved_recall,
            target_met = outcome.target_met,
            probes = outcome.probes_used,
            "calibration finished"
        );
        self.set_search_parameters(outcome.parameters)?;
        Ok(outcome)
    }

    /// Write a self-contained snapshot: configuration, build and search
    /// parameters, entry point, external ids, adjacency lists, and vectors.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);

        file.write_all(INDEX_MAGIC)?;
        file.write_u32::<LittleEndian>(INDEX_VERSION)?;
        file.write_u32::<LittleEndian>(self.config.dimensions as u32)?;
        file.write_u8(self.config.metric.to_tag())?;
        file.write_u8(self.config.encoding.to_tag())?;

        write_build_params(&mut file, &self.build_params)?;
        write_search_params(&mut file, &self.search_parameters())?;

        file.write_u64::<LittleEndian>(self.ids.len() as u64)?;
        file.write_u32::<LittleEndian>(self.entry_point)?;

        for &id in &self.ids {
            file.write_u64::<LittleEndian>(id)?;
        }

        write_adjacency(&mut file, &self.graph)?;
        write_vectors(&mut file, &self.store)?;

        file.flush()?;
        Ok(())
    }

    /// Reload a snapshot written by [`VamanaIndex::save`]. Search behavior
    /// is bit-identical to the index that was saved.
    pub fn load(path: &Path) -> Result<Self> {
        let mut file = std::io::BufReader::new(std::fs::File::open(path)?);

        let mut magic = [0u8; 8];
        file.read_exact(&mut magic)?;
        if &magic != INDEX_MAGIC {
            return Err(Error::IndexCorruption {
                details: "bad index snapshot magic".to_string(),
            });
        }
        let version = file.read_u32::<LittleEndian>()?;
        if version != INDEX_VERSION {
            return Err(Error::IndexCorruption {
                details: format!("unsupported index snapshot version {}", version),
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

        let n = file.read_u64::<LittleEndian>()? as usize;
        let entry_point = file.read_u32::<LittleEndian>()?;

        let mut ids = Vec::with_capacity(n);
        for _ in 0..n {
            ids.push(file.read_u64::<LittleEndian>()?);
        }

        let graph = read_adjacency(&mut file, n, build_params.graph_max_degree)?;
        let store = read_vectors(&mut file, n, dimensions, encoding)?;

        Ok(Self {
            config,
            build_params,
            oracle: DistanceOracle::resolve(metric, encoding),
            store,
            graph,
            ids,
            entry_point,
            search_params: RwLock::new(search_params),
        })
    }
}

impl AnnIndex for VamanaIndex {
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        VamanaIndex::search(self, query, k)
    }

    fn len(&self) -> usize {
        self.ids.len()
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }
}

// ============================================================================
// Snapshot helpers (shared with the dynamic index)
// ============================================================================

pub(crate) fn write_build_params<W: Write>(w: &mut W, p: &BuildParameters) -> Result<()> {
    w.write_f32::<LittleEndian>(p.alpha)?;
    w.write_u32::<LittleEndian>(p.graph_max_degree as u32)?;
    w.write_u32::<LittleEndian>(p.window_size as u32)?;
    w.write_u32::<LittleEndian>(p.max_candidate_pool_size as u32)?;
    w.write_u32::<LittleEndian>(p.prune_to as u32)?;
    w.write_u8(p.use_full_search_history as u8)?;
    Ok(())
}

pub(crate) fn read_build_params<R: Read>(r: &mut R) -> Result<BuildParameters> {
    let params = BuildParameters {
        alpha: r.read_f32::<LittleEndian>()?,
        graph_max_degree: r.read_u32::<LittleEndian>()? as usize,
        window_size: r.read_u32::<LittleEndian>()? as usize,
        max_candidate_pool_size: r.read_u32::<LittleEndian>()? as usize,
        prune_to: r.read_u32::<LittleEndian>()? as usize,
        use_full_search_history: r.read_u8()? != 0,
    };
    params.validate().map_err(|e| Error::IndexCorruption {
        details: format!("snapshot build parameters invalid: {}", e),
    })?;
    Ok(params)
}

pub(crate) fn write_search_params<W: Write>(w: &mut W, p: &SearchParameters) -> Result<()> {
    w.write_u32::<LittleEndian>(p.search_window_size as u32)?;
    w.write_u32::<LittleEndian>(p.search_buffer_capacity as u32)?;
    w.write_u8(p.visited_set_enabled as u8)?;
    Ok(())
}

pub(crate) fn read_search_params<R: Read>(r: &mut R) -> Result<SearchParameters> {
    let params = SearchParameters {
        search_window_size: r.read_u32::<LittleEndian>()? as usize,
        search_buffer_capacity: r.read_u32::<LittleEndian>()? as usize,
        visited_set_enabled: r.read_u8()? != 0,
    };
    params.validate().map_err(|e| Error::IndexCorruption {
        details: format!("snapshot search parameters invalid: {}", e),
    })?;
    Ok(params)
}

pub(crate) fn read_metric<R: Read>(r: &mut R) -> Result<DistanceMetric> {
    let tag = r.read_u8()?;
    DistanceMetric::from_tag(tag).ok_or_else(|| Error::IndexCorruption {
        details: format!("unknown metric tag {}", tag),
    })
}

pub(crate) fn read_encoding<R: Read>(r: &mut R) -> Result<VectorEncoding> {
    let tag = r.read_u8()?;
    VectorEncoding::from_tag(tag).ok_or_else(|| Error::IndexCorruption {
        details: format!("unknown encoding tag {}", tag),
    })
}

pub(crate) fn write_adjacency<W: Write>(w: &mut W, graph: &AdjacencyStore) -> Result<()> {
    let reader = graph.read();
    for node in 0..reader.len() as u32 {
        let neighbors = reader.neighbors(node);
        w.write_u32::<LittleEndian>(neighbors.len() as u32)?;
        for &id in neighbors.iter() {
            w.write_u32::<LittleEndian>(id)?;
        }
    }
    Ok(())
}

pub(crate) fn read_adjacency<R: Read>(
    r: &mut R,
    n: usize,
    max_degree: usize,
) -> Result<AdjacencyStore> {
    let graph = AdjacencyStore::new(n, max_degree);
    let reader = graph.read();
    for node in 0..n as u32 {
        let degree = r.read_u32::<LittleEndian>()? as usize;
        if degree > max_degree {
            return Err(Error::IndexCorruption {
                details: format!(
                    "node {} has degree {} above the bound {}",
                    node, degree, max_degree
                ),
            });
        }
        let mut list = Vec::with_capacity(degree);
        for _ in 0..degree {
            let target = r.read_u32::<LittleEndian>()?;
            if target as usize >= n {
                return Err(Error::IndexCorruption {
                    details: format!("node {} has dangling edge to {}", node, target),
                });
            }
            list.push(target);
        }
        reader.replace(node, list);
    }
    drop(reader);
    Ok(graph)
}

pub(crate) fn write_vectors<W: Write>(w: &mut W, store: &VectorStore) -> Result<()> {
    let reader = store.read();
    match store.encoding() {
        VectorEncoding::F32 => {
            for &v in reader.raw_f32() {
                w.write_f32::<LittleEndian>(v)?;
            }
        }
        VectorEncoding::Sq8 => {
            for &v in reader.raw_sq8() {
                w.write_i8(v)?;
            }
        }
    }
    Ok(())
}

pub(crate) fn read_vectors<R: Read>(
    r: &mut R,
    n: usize,
    dim: usize,
    encoding: VectorEncoding,
) -> Result<VectorStore> {
    match encoding {
        VectorEncoding::F32 => {
            let mut vectors = Vec::with_capacity(n * dim);
            for _ in 0..n * dim {
                vectors.push(r.read_f32::<LittleEndian>()?);
            }
            VectorStore::from_vectors(dim, encoding, &vectors)
        }
        VectorEncoding::Sq8 => {
            // Quantized snapshots round-trip the i8 payload untouched
            let store = VectorStore::new(dim, encoding);
            store.grow(n);
            let mut buf = vec![0.0f32; dim];
            for slot in 0..n as u32 {
                for value in buf.iter_mut() {
                    *value = r.read_i8()? as f32 / 127.0;
                }
                store.set(slot, &buf)?;
            }
            Ok(store)
        }
    }
}
