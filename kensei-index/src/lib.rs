//! # Kensei Vector Index
//!
//! Approximate nearest-neighbor search over high-dimensional vectors, built
//! around a navigable bounded-degree proximity graph with full support for
//! insertion and deletion without rebuilds.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Index Layer                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌───────────┐   ┌─────────────┐   ┌──────────────────┐     │
//! │  │   Flat    │   │   Vamana    │   │  Dynamic Vamana  │     │
//! │  │  (Exact)  │   │  (Static)   │   │ (Insert/Delete)  │     │
//! │  └─────┬─────┘   └──────┬──────┘   └────────┬─────────┘     │
//! │        │                │                   │               │
//! │        │         ┌──────┴──────┐     ┌──────┴──────┐        │
//! │        │         │   Builder   │     │ Consolidate │        │
//! │        │         │ Search+Prune│     │  + Compact  │        │
//! │        │         └──────┬──────┘     └──────┬──────┘        │
//! │        └────────────────┴───────────┬───────┘               │
//! │                                     │                       │
//! │      ┌───────────────┬──────────────┴───┬──────────────┐    │
//! │      │  SIMD Math    │  Vector Store    │  Adjacency   │    │
//! │      │ (AVX2/NEON)   │  (f32 / SQ8)     │  (arena)     │    │
//! │      └───────────────┴──────────────────┴──────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `simd`: SIMD-accelerated distance kernels (AVX2/FMA, NEON)
//! - `store`: per-slot vector storage and the metric x encoding oracle
//! - `graph`: degree-bounded adjacency arena with per-slot locking
//! - `search`: bounded-buffer greedy traversal
//! - `prune`: diversity pruning for neighbor selection
//! - `builder`: parallel two-pass graph construction
//! - `index`: the static index and its batch search engine
//! - `dynamic`: insert / delete / consolidate / compact over a live graph
//! - `calibrate`: recall-targeted search parameter tuning
//! - `flat`: brute-force exact search (ground truth)

pub mod builder;
pub mod calibrate;
pub mod dynamic;
pub mod flat;
pub mod graph;
pub mod index;
pub mod prune;
pub mod search;
pub mod simd;
pub mod store;
pub mod traits;

pub use builder::BuildParameters;
pub use calibrate::{recall_at_k, CalibrationOutcome, CalibrationParameters};
pub use dynamic::{AddOutcome, DeleteOutcome, DynamicVamanaIndex, SlotState};
pub use flat::FlatIndex;
pub use index::{IndexConfig, VamanaIndex};
pub use search::SearchParameters;
pub use simd::DistanceMetric;
pub use store::{DistanceOracle, VectorEncoding, VectorStore};
pub use traits::{AnnIndex, SearchResult};
