//! # Vector Storage
//!
//! Fixed-dimension vector storage addressable by dense slot index, plus the
//! [`DistanceOracle`] that binds a metric to a storage encoding.
//!
//! ## Architecture
//! - Vectors stored in contiguous memory (cache-friendly), one slot per node
//! - Two encodings: plain `f32` and SQ8 (`i8` scalar quantization); the
//!   quantized encoding is decoded on read by the integer distance kernels,
//!   never materialized as floats in the hot path
//! - Metric and encoding are resolved once per build/search call into a
//!   [`DistanceOracle`] variant so the inner loop is a direct kernel call

use parking_lot::{RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};

use kensei_core::error::{Error, Result};

use crate::simd::{
    cosine_distance, cosine_similarity_sq8, dequantize_sq8, dot_product, dot_product_sq8,
    l2_distance_squared, l2_squared_sq8, quantize_sq8, DistanceMetric,
};

/// Element encoding for stored vectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VectorEncoding {
    /// Plain 32-bit floats
    F32,
    /// Scalar quantization to i8, values assumed in [-1, 1]
    Sq8,
}

impl VectorEncoding {
    pub fn to_tag(self) -> u8 {
        match self {
            VectorEncoding::F32 => 0,
            VectorEncoding::Sq8 => 1,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(VectorEncoding::F32),
            1 => Some(VectorEncoding::Sq8),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct StoreData {
    f32s: Vec<f32>,
    sq8s: Vec<i8>,
    slots: usize,
}

/// Contiguous per-slot vector storage.
///
/// Writes lock the whole store briefly; reads share a single guard for the
/// duration of one search so the hot loop never re-locks.
#[derive(Debug)]
pub struct VectorStore {
    dim: usize,
    encoding: VectorEncoding,
    data: RwLock<StoreData>,
}

impl VectorStore {
    pub fn new(dim: usize, encoding: VectorEncoding) -> Self {
        Self {
            dim,
            encoding,
            data: RwLock::new(StoreData::default()),
        }
    }

    pub fn with_capacity(dim: usize, encoding: VectorEncoding, capacity: usize) -> Self {
        let store = Self::new(dim, encoding);
        store.reserve(capacity);
        store
    }

    /// Build a store directly from row-major f32 data, encoding as configured.
    pub fn from_vectors(dim: usize, encoding: VectorEncoding, vectors: &[f32]) -> Result<Self> {
        if dim == 0 || vectors.len() % dim != 0 {
            return Err(Error::DimensionMismatch {
                expected: dim,
                got: vectors.len(),
            });
        }
        let slots = vectors.len() / dim;
        let mut data = StoreData {
            slots,
            ..StoreData::default()
        };
        match encoding {
            VectorEncoding::F32 => data.f32s = vectors.to_vec(),
            VectorEncoding::Sq8 => data.sq8s = quantize_sq8(vectors),
        }
        Ok(Self {
            dim,
            encoding,
            data: RwLock::new(data),
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dim
    }

    pub fn encoding(&self) -> VectorEncoding {
        self.encoding
    }

    /// Number of slots (allocated, not necessarily live)
    pub fn len(&self) -> usize {
        self.data.read().slots
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pre-allocate room for `additional` more slots
    pub fn reserve(&self, additional: usize) {
        let mut data = self.data.write();
        match self.encoding {
            VectorEncoding::F32 => data.f32s.reserve(additional * self.dim),
            VectorEncoding::Sq8 => data.sq8s.reserve(additional * self.dim),
        }
    }

    /// Append one slot, returning its index
    pub fn push(&self, vector: &[f32]) -> Result<u32> {
        self.check_dim(vector)?;
        let mut data = self.data.write();
        let slot = data.slots as u32;
        match self.encoding {
            VectorEncoding::F32 => data.f32s.extend_from_slice(vector),
            VectorEncoding::Sq8 => data.sq8s.extend(quantize_sq8(vector)),
        }
        data.slots += 1;
        Ok(slot)
    }

    /// Overwrite the vector in an existing slot
    pub fn set(&self, slot: u32, vector: &[f32]) -> Result<()> {
        self.check_dim(vector)?;
        let mut data = self.data.write();
        let slot = slot as usize;
        if slot >= data.slots {
            return Err(Error::Internal {
                message: format!("slot {} out of bounds ({} slots)", slot, data.slots),
            });
        }
        let start = slot * self.dim;
        match self.encoding {
            VectorEncoding::F32 => data.f32s[start..start + self.dim].copy_from_slice(vector),
            VectorEncoding::Sq8 => {
                let quantized = quantize_sq8(vector);
                data.sq8s[start..start + self.dim].copy_from_slice(&quantized);
            }
        }
        Ok(())
    }

    /// Grow to `new_len` slots, zero-filling the new ones
    pub fn grow(&self, new_len: usize) {
        let mut data = self.data.write();
        if new_len <= data.slots {
            return;
        }
        match self.encoding {
            VectorEncoding::F32 => data.f32s.resize(new_len * self.dim, 0.0),
            VectorEncoding::Sq8 => data.sq8s.resize(new_len * self.dim, 0),
        }
        data.slots = new_len;
    }

    /// Decoded copy of one slot
    pub fn get(&self, slot: u32) -> Option<Vec<f32>> {
        let data = self.data.read();
        let slot = slot as usize;
        if slot >= data.slots {
            return None;
        }
        let start = slot * self.dim;
        Some(match self.encoding {
            VectorEncoding::F32 => data.f32s[start..start + self.dim].to_vec(),
            VectorEncoding::Sq8 => dequantize_sq8(&data.sq8s[start..start + self.dim]),
        })
    }

    /// Keep exactly the slots listed in `new_to_old` (ascending), moving each
    /// to its position in the list. Truncates to `new_to_old.len()` slots.
    ///
    /// Ascending order makes the forward in-place copy safe: slot `j` is
    /// written only after every old slot `< new_to_old[j]` has been consumed.
    pub fn compact(&self, new_to_old: &[u32]) {
        debug_assert!(new_to_old.windows(2).all(|w| w[0] < w[1]));
        let mut data = self.data.write();
        let dim = self.dim;
        for (new_slot, &old_slot) in new_to_old.iter().enumerate() {
            let old_slot = old_slot as usize;
            if new_slot == old_slot {
                continue;
            }
            let src = old_slot * dim;
            let dst = new_slot * dim;
            match self.encoding {
                VectorEncoding::F32 => data.f32s.copy_within(src..src + dim, dst),
                VectorEncoding::Sq8 => data.sq8s.copy_within(src..src + dim, dst),
            }
        }
        let new_len = new_to_old.len();
        match self.encoding {
            VectorEncoding::F32 => data.f32s.truncate(new_len * dim),
            VectorEncoding::Sq8 => data.sq8s.truncate(new_len * dim),
        }
        data.slots = new_len;
    }

    /// Acquire a read guard for repeated access during one search or build step
    pub fn read(&self) -> StoreReader<'_> {
        StoreReader {
            dim: self.dim,
            encoding: self.encoding,
            data: self.data.read(),
        }
    }

    fn check_dim(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dim {
            return Err(Error::DimensionMismatch {
                expected: self.dim,
                got: vector.len(),
            });
        }
        Ok(())
    }
}

/// Read access to the store for the duration of one operation
pub struct StoreReader<'a> {
    dim: usize,
    encoding: VectorEncoding,
    data: RwLockReadGuard<'a, StoreData>,
}

impl StoreReader<'_> {
    pub fn len(&self) -> usize {
        self.data.slots
    }

    pub fn is_empty(&self) -> bool {
        self.data.slots == 0
    }

    #[inline]
    pub fn slot_f32(&self, slot: u32) -> &[f32] {
        let start = slot as usize * self.dim;
        &self.data.f32s[start..start + self.dim]
    }

    #[inline]
    pub fn slot_sq8(&self, slot: u32) -> &[i8] {
        let start = slot as usize * self.dim;
        &self.data.sq8s[start..start + self.dim]
    }

    /// Decoded copy of one slot, appended into `out`
    pub fn copy_decoded(&self, slot: u32, out: &mut Vec<f32>) {
        out.clear();
        match self.encoding {
            VectorEncoding::F32 => out.extend_from_slice(self.slot_f32(slot)),
            VectorEncoding::Sq8 => {
                out.extend(self.slot_sq8(slot).iter().map(|&x| x as f32 / 127.0))
            }
        }
    }

    /// Full raw f32 buffer (for serialization; valid for F32 encoding)
    pub fn raw_f32(&self) -> &[f32] {
        &self.data.f32s
    }

    /// Full raw sq8 buffer (for serialization; valid for Sq8 encoding)
    pub fn raw_sq8(&self) -> &[i8] {
        &self.data.sq8s
    }
}

/// A query prepared once per search call: quantized up front when the store
/// encoding requires it.
pub struct PreparedQuery {
    raw: Vec<f32>,
    quantized: Vec<i8>,
}

impl PreparedQuery {
    pub fn raw(&self) -> &[f32] {
        &self.raw
    }
}

/// Metric x encoding resolved into a closed set of tagged variants.
///
/// One variant is picked per index or per search call; the hot loop then
/// dispatches on a plain enum, preserving inlining of the kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceOracle {
    L2F32,
    InnerProductF32,
    CosineF32,
    L2Sq8,
    InnerProductSq8,
    CosineSq8,
}

impl DistanceOracle {
    pub fn resolve(metric: DistanceMetric, encoding: VectorEncoding) -> Self {
        match (metric, encoding) {
            (DistanceMetric::L2, VectorEncoding::F32) => DistanceOracle::L2F32,
            (DistanceMetric::InnerProduct, VectorEncoding::F32) => DistanceOracle::InnerProductF32,
            (DistanceMetric::Cosine, VectorEncoding::F32) => DistanceOracle::CosineF32,
            (DistanceMetric::L2, VectorEncoding::Sq8) => DistanceOracle::L2Sq8,
            (DistanceMetric::InnerProduct, VectorEncoding::Sq8) => DistanceOracle::InnerProductSq8,
            (DistanceMetric::Cosine, VectorEncoding::Sq8) => DistanceOracle::CosineSq8,
        }
    }

    pub fn metric(&self) -> DistanceMetric {
        match self {
            DistanceOracle::L2F32 | DistanceOracle::L2Sq8 => DistanceMetric::L2,
            DistanceOracle::InnerProductF32 | DistanceOracle::InnerProductSq8 => {
                DistanceMetric::InnerProduct
            }
            DistanceOracle::CosineF32 | DistanceOracle::CosineSq8 => DistanceMetric::Cosine,
        }
    }

    /// Prepare a query for repeated distance computations
    pub fn prepare(&self, query: &[f32]) -> PreparedQuery {
        let quantized = match self {
            DistanceOracle::L2Sq8 | DistanceOracle::InnerProductSq8 | DistanceOracle::CosineSq8 => {
                quantize_sq8(query)
            }
            _ => Vec::new(),
        };
        PreparedQuery {
            raw: query.to_vec(),
            quantized,
        }
    }

    /// Dissimilarity between a prepared query and a stored slot.
    /// Smaller is always better.
    #[inline]
    pub fn query_to(&self, query: &PreparedQuery, store: &StoreReader<'_>, slot: u32) -> f32 {
        match self {
            DistanceOracle::L2F32 => l2_distance_squared(&query.raw, store.slot_f32(slot)),
            DistanceOracle::InnerProductF32 => -dot_product(&query.raw, store.slot_f32(slot)),
            DistanceOracle::CosineF32 => cosine_distance(&query.raw, store.slot_f32(slot)),
            DistanceOracle::L2Sq8 => {
                l2_squared_sq8(&query.quantized, store.slot_sq8(slot)) as f32
            }
            DistanceOracle::InnerProductSq8 => {
                -(dot_product_sq8(&query.quantized, store.slot_sq8(slot)) as f32)
            }
            DistanceOracle::CosineSq8 => {
                1.0 - cosine_similarity_sq8(&query.quantized, store.slot_sq8(slot))
            }
        }
    }

    /// Dissimilarity between two stored slots
    #[inline]
    pub fn between(&self, store: &StoreReader<'_>, a: u32, b: u32) -> f32 {
        match self {
            DistanceOracle::L2F32 => l2_distance_squared(store.slot_f32(a), store.slot_f32(b)),
            DistanceOracle::InnerProductF32 => -dot_product(store.slot_f32(a), store.slot_f32(b)),
            DistanceOracle::CosineF32 => cosine_distance(store.slot_f32(a), store.slot_f32(b)),
            DistanceOracle::L2Sq8 => l2_squared_sq8(store.slot_sq8(a), store.slot_sq8(b)) as f32,
            DistanceOracle::InnerProductSq8 => {
                -(dot_product_sq8(store.slot_sq8(a), store.slot_sq8(b)) as f32)
            }
            DistanceOracle::CosineSq8 => {
                1.0 - cosine_similarity_sq8(store.slot_sq8(a), store.slot_sq8(b))
            }
        }
    }
}
