//! # Index Traits
//!
//! Common interface shared by the exact and graph indexes.

use kensei_core::error::Result;

/// Search result with external id and dissimilarity score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchResult {
    pub id: u64,
    pub distance: f32,
}

impl Eq for SearchResult {}

impl PartialOrd for SearchResult {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SearchResult {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Smaller distance = smaller in ordering; a BinaryHeap of these is a
        // max-heap with the worst result on top. Ties broken by id.
        self.distance
            .total_cmp(&other.distance)
            .then(self.id.cmp(&other.id))
    }
}

/// Nearest-neighbor index over fixed-dimension vectors
pub trait AnnIndex: Send + Sync {
    /// Search for the k nearest neighbors of a single query
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>>;

    /// Number of searchable vectors
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Vector dimension
    fn dimensions(&self) -> usize;
}
