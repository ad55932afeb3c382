//! Cross-module tests: kernels, exact index, static graph index, parameter
//! validation, and persistence round trips.

use kensei_index::{
    prune, simd, AnnIndex, BuildParameters, DistanceMetric, DistanceOracle, FlatIndex,
    IndexConfig, SearchParameters, VamanaIndex, VectorEncoding, VectorStore,
};
use rand::Rng;
use tempfile::TempDir;

fn random_vectors(n: usize, dim: usize) -> Vec<f32> {
    let mut rng = rand::thread_rng();
    (0..n * dim).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

fn config(dim: usize) -> IndexConfig {
    IndexConfig {
        dimensions: dim,
        metric: DistanceMetric::L2,
        encoding: VectorEncoding::F32,
    }
}

fn small_build_params(degree: usize, window: usize) -> BuildParameters {
    BuildParameters {
        alpha: 1.2,
        graph_max_degree: degree,
        window_size: window,
        max_candidate_pool_size: window * 4,
        prune_to: degree,
        use_full_search_history: true,
    }
}

// ============================================================================
// SIMD kernel tests
// ============================================================================

#[test]
fn test_dot_product_matches_scalar() {
    let a = random_vectors(1, 768);
    let b = random_vectors(1, 768);
    let expected: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    assert!((simd::dot_product(&a, &b) - expected).abs() < 1e-3);
}

#[test]
fn test_l2_squared_matches_scalar() {
    let a = random_vectors(1, 131); // odd length exercises the remainder path
    let b = random_vectors(1, 131);
    let expected: f32 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum();
    assert!((simd::l2_distance_squared(&a, &b) - expected).abs() < 1e-3);
}

#[test]
fn test_cosine_similarity_range_and_self() {
    let a = random_vectors(1, 768);
    let b = random_vectors(1, 768);
    let sim = simd::cosine_similarity(&a, &b);
    assert!((-1.01..=1.01).contains(&sim));
    assert!((simd::cosine_similarity(&a, &a) - 1.0).abs() < 1e-5);
}

#[test]
fn test_sq8_quantization_roundtrip() {
    let original = vec![0.5, -0.5, 1.0, -1.0, 0.0];
    let quantized = simd::quantize_sq8(&original);
    let restored = simd::dequantize_sq8(&quantized);
    for (o, r) in original.iter().zip(restored.iter()) {
        assert!((o - r).abs() < 0.01);
    }
}

#[test]
fn test_sq8_dot_product_tracks_exact() {
    let a = random_vectors(1, 768);
    let b = random_vectors(1, 768);
    let qa = simd::quantize_sq8(&a);
    let qb = simd::quantize_sq8(&b);
    let exact = simd::dot_product(&a, &b);
    let approx = simd::dot_product_sq8(&qa, &qb) as f32 / (127.0 * 127.0);
    let error = (exact - approx).abs() / exact.abs().max(1.0);
    assert!(error < 0.1);
}

// ============================================================================
// Pruning property: the alpha exclusion rule holds over the output
// ============================================================================

#[test]
fn test_prune_output_satisfies_exclusion_rule() {
    use kensei_index::search::Neighbor;

    let dim = 16;
    let n = 300;
    let vectors = random_vectors(n, dim);
    let store = VectorStore::from_vectors(dim, VectorEncoding::F32, &vectors).unwrap();
    let oracle = DistanceOracle::resolve(DistanceMetric::L2, VectorEncoding::F32);
    let alpha = 1.3f32;

    let reader = store.read();
    let node = 0u32;
    let mut pool: Vec<Neighbor> = (1..n as u32)
        .map(|id| Neighbor::new(id, oracle.between(&reader, node, id)))
        .collect();
    prune::prepare_pool(&mut pool, node, n);

    let mut out = Vec::new();
    prune::robust_prune(&reader, oracle, node, &pool, alpha, 24, &mut out);

    assert!(!out.is_empty());
    assert!(out.len() <= 24);
    // No retained later neighbor may be "covered" by an earlier one
    let node_dist: std::collections::HashMap<u32, f32> =
        pool.iter().map(|c| (c.id, c.distance)).collect();
    for (i, &c) in out.iter().enumerate() {
        for &c_prime in &out[i + 1..] {
            let d_pair = oracle.between(&reader, c, c_prime);
            assert!(
                alpha * d_pair > node_dist[&c_prime],
                "retained pair ({}, {}) violates the exclusion rule",
                c,
                c_prime
            );
        }
    }
}

// ============================================================================
// Static index tests
// ============================================================================

#[test]
fn test_build_rejects_bad_configuration() {
    let vectors = random_vectors(10, 8);
    let ids: Vec<u64> = (0..10).collect();
    let params = BuildParameters {
        prune_to: 20,
        graph_max_degree: 16,
        ..Default::default()
    };
    let err = VamanaIndex::build(config(8), params, &ids, &vectors).unwrap_err();
    assert_eq!(err.error_code(), "CONFIG_ERROR");
}

#[test]
fn test_build_rejects_duplicate_ids() {
    let vectors = random_vectors(3, 8);
    let err =
        VamanaIndex::build(config(8), small_build_params(8, 16), &[1, 2, 1], &vectors)
            .unwrap_err();
    assert_eq!(err.error_code(), "CONFIG_ERROR");
}

#[test]
fn test_search_finds_exact_match() {
    let dim = 32;
    let n = 500;
    let vectors = random_vectors(n, dim);
    let ids: Vec<u64> = (0..n as u64).collect();
    let index = VamanaIndex::build(config(dim), small_build_params(16, 32), &ids, &vectors)
        .unwrap();

    let query = &vectors[42 * dim..43 * dim];
    let results = index.search(query, 5).unwrap();
    assert_eq!(results[0].id, 42);
    assert!(results[0].distance < 1e-3);
    for pair in results.windows(2) {
        assert!(pair[0].distance <= pair[1].distance);
    }
}

#[test]
fn test_degree_bound_holds_after_build() {
    let dim = 16;
    let n = 400;
    let vectors = random_vectors(n, dim);
    let ids: Vec<u64> = (0..n as u64).collect();
    let index = VamanaIndex::build(config(dim), small_build_params(12, 24), &ids, &vectors)
        .unwrap();
    assert!(index.max_out_degree() <= 12);
}

#[test]
fn test_k_above_capacity_is_configuration_error() {
    let dim = 8;
    let vectors = random_vectors(50, dim);
    let ids: Vec<u64> = (0..50).collect();
    let index = VamanaIndex::build(config(dim), small_build_params(8, 16), &ids, &vectors)
        .unwrap();
    index
        .set_search_parameters(SearchParameters {
            search_window_size: 5,
            search_buffer_capacity: 5,
            visited_set_enabled: false,
        })
        .unwrap();

    let err = index.search(&vectors[0..dim], 10).unwrap_err();
    assert_eq!(err.error_code(), "CONFIG_ERROR");
    let err = index.search_batch(&vectors[0..dim], 10).unwrap_err();
    assert_eq!(err.error_code(), "CONFIG_ERROR");
}

#[test]
fn test_capacity_below_window_rejected() {
    let params = SearchParameters {
        search_window_size: 20,
        search_buffer_capacity: 10,
        visited_set_enabled: false,
    };
    assert!(params.validate().is_err());
}

#[test]
fn test_query_dimension_mismatch() {
    let dim = 16;
    let vectors = random_vectors(100, dim);
    let ids: Vec<u64> = (0..100).collect();
    let index = VamanaIndex::build(config(dim), small_build_params(8, 16), &ids, &vectors)
        .unwrap();
    let err = index.search(&[1.0, 2.0], 5).unwrap_err();
    assert_eq!(err.error_code(), "DIMENSION_MISMATCH");
}

#[test]
fn test_batch_rows_follow_input_order() {
    let dim = 8;
    let n = 200;
    let vectors = random_vectors(n, dim);
    let ids: Vec<u64> = (0..n as u64).collect();
    let index = VamanaIndex::build(config(dim), small_build_params(8, 16), &ids, &vectors)
        .unwrap();

    let mut queries = Vec::new();
    queries.extend_from_slice(&vectors[7 * dim..8 * dim]);
    queries.extend_from_slice(&vectors[99 * dim..100 * dim]);
    let (result_ids, distances) = index.search_batch(&queries, 3).unwrap();
    assert_eq!(result_ids.len(), 6);
    assert_eq!(distances.len(), 6);
    assert_eq!(result_ids[0], 7);
    assert_eq!(result_ids[3], 99);
}

#[test]
fn test_save_load_reproduces_search_exactly() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("static.knsi");

    let dim = 24;
    let n = 300;
    let vectors = random_vectors(n, dim);
    let ids: Vec<u64> = (0..n as u64).collect();
    let index = VamanaIndex::build(config(dim), small_build_params(12, 24), &ids, &vectors)
        .unwrap();
    index.save(&path).unwrap();

    let loaded = VamanaIndex::load(&path).unwrap();
    assert_eq!(loaded.len(), n);

    let queries = random_vectors(20, dim);
    let (ids_a, dist_a) = index.search_batch(&queries, 10).unwrap();
    let (ids_b, dist_b) = loaded.search_batch(&queries, 10).unwrap();
    assert_eq!(ids_a, ids_b);
    assert_eq!(dist_a, dist_b);
}

#[test]
fn test_load_rejects_garbage() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("garbage.knsi");
    std::fs::write(&path, b"definitely not an index snapshot").unwrap();
    let err = VamanaIndex::load(&path).unwrap_err();
    assert_eq!(err.error_code(), "INDEX_CORRUPTION");
}

#[test]
fn test_sq8_index_end_to_end() {
    let dim = 32;
    let n = 400;
    let vectors = random_vectors(n, dim);
    let ids: Vec<u64> = (0..n as u64).collect();
    let sq8_config = IndexConfig {
        dimensions: dim,
        metric: DistanceMetric::L2,
        encoding: VectorEncoding::Sq8,
    };
    let index =
        VamanaIndex::build(sq8_config, small_build_params(16, 32), &ids, &vectors).unwrap();

    let query = &vectors[7 * dim..8 * dim];
    let results = index.search(query, 5).unwrap();
    assert_eq!(results[0].id, 7);
}

// ============================================================================
// Flat index as a trait object (shared AnnIndex seam)
// ============================================================================

#[test]
fn test_ann_index_trait_objects() {
    let dim = 16;
    let n = 200;
    let vectors = random_vectors(n, dim);
    let ids: Vec<u64> = (0..n as u64).collect();

    let flat = FlatIndex::new(config(dim));
    for i in 0..n {
        flat.insert(ids[i], &vectors[i * dim..(i + 1) * dim]).unwrap();
    }
    let vamana = VamanaIndex::build(config(dim), small_build_params(8, 16), &ids, &vectors)
        .unwrap();

    let indexes: Vec<Box<dyn AnnIndex>> = vec![Box::new(flat), Box::new(vamana)];
    for index in &indexes {
        assert_eq!(index.len(), n);
        assert_eq!(index.dimensions(), dim);
        let results = index.search(&vectors[0..dim], 3).unwrap();
        assert_eq!(results[0].id, 0);
    }
}
