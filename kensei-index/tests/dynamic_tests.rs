//! Dynamic index tests: the slot state machine, consolidation and
//! compaction invariants, id translation, and snapshot round trips.

use std::collections::HashSet;

use kensei_index::{
    BuildParameters, DistanceMetric, DynamicVamanaIndex, IndexConfig, SearchParameters,
    VectorEncoding,
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

fn build_params(degree: usize, window: usize) -> BuildParameters {
    BuildParameters {
        alpha: 1.2,
        graph_max_degree: degree,
        window_size: window,
        max_candidate_pool_size: window * 4,
        prune_to: degree,
        use_full_search_history: false,
    }
}

fn seeded_index(n: usize, dim: usize) -> (DynamicVamanaIndex, Vec<f32>) {
    let vectors = random_vectors(n, dim);
    let ids: Vec<u64> = (0..n as u64).collect();
    let index = DynamicVamanaIndex::build(config(dim), build_params(16, 32), &ids, &vectors)
        .unwrap();
    (index, vectors)
}

#[test]
fn test_add_then_search_finds_new_vectors() {
    let dim = 16;
    let (index, _) = seeded_index(500, dim);

    let extra = random_vectors(50, dim);
    let extra_ids: Vec<u64> = (1000..1050).collect();
    let outcome = index.add(&extra, &extra_ids).unwrap();
    assert_eq!(outcome.added, 50);
    assert!(outcome.rejected_duplicates.is_empty());
    assert_eq!(index.len(), 550);

    // Every new vector should be findable as its own nearest neighbor
    let mut found = 0;
    for (i, row) in extra.chunks_exact(dim).enumerate() {
        let results = index.search(row, 1).unwrap();
        if results.first().map(|r| r.id) == Some(extra_ids[i]) {
            found += 1;
        }
    }
    assert!(found >= 48, "only {}/50 inserts are self-findable", found);
}

#[test]
fn test_add_reports_duplicates_per_item() {
    let dim = 16;
    let (index, _) = seeded_index(100, dim);

    let extra = random_vectors(3, dim);
    // id 5 already exists; 200 repeats within the batch
    let outcome = index.add(&extra, &[5, 200, 200]).unwrap();
    assert_eq!(outcome.added, 1);
    assert_eq!(outcome.rejected_duplicates, vec![5, 200]);
    assert!(index.has_id(200));
}

#[test]
fn test_add_dimension_mismatch_fails_whole_call() {
    let dim = 16;
    let (index, _) = seeded_index(100, dim);
    let err = index.add(&[1.0, 2.0, 3.0], &[900]).unwrap_err();
    assert_eq!(err.error_code(), "DIMENSION_MISMATCH");
    assert!(!index.has_id(900));
}

#[test]
fn test_delete_is_soft_and_reports_unknown() {
    let dim = 16;
    let (index, vectors) = seeded_index(300, dim);

    let outcome = index.delete(&[3, 4, 9999]);
    assert_eq!(outcome.deleted, 2);
    assert_eq!(outcome.unknown, vec![9999]);
    assert_eq!(index.len(), 298);
    assert!(!index.has_id(3));

    // Tombstoned vectors are traversed but never returned
    let results = index.search(&vectors[3 * dim..4 * dim], 5).unwrap();
    assert!(results.iter().all(|r| r.id != 3 && r.id != 4));
}

#[test]
fn test_degree_bound_holds_through_mutation() {
    let dim = 16;
    let (index, _) = seeded_index(400, dim);
    assert!(index.max_out_degree() <= 16);

    let extra = random_vectors(200, dim);
    let extra_ids: Vec<u64> = (2000..2200).collect();
    index.add(&extra, &extra_ids).unwrap();
    assert!(index.max_out_degree() <= 16);

    index.delete(&(0..100u64).collect::<Vec<_>>());
    index.consolidate().unwrap();
    assert!(index.max_out_degree() <= 16);
}

#[test]
fn test_consolidate_removes_all_tombstone_references() {
    let dim = 16;
    let (index, _) = seeded_index(600, dim);

    index.delete(&(100..250u64).collect::<Vec<_>>());
    // Before consolidation live lists may still point at tombstones
    index.validate_graph(true).unwrap();

    index.consolidate().unwrap();
    // Afterwards they may not
    index.validate_graph(false).unwrap();
}

#[test]
fn test_consolidate_is_idempotent() {
    let dim = 16;
    let (index, _) = seeded_index(500, dim);

    index.delete(&(50..150u64).collect::<Vec<_>>());
    index.consolidate().unwrap();
    let after_first = index.adjacency_lists();

    let repaired = index.consolidate().unwrap();
    assert_eq!(repaired, 0);
    assert_eq!(index.adjacency_lists(), after_first);
}

#[test]
fn test_consolidate_replaces_deleted_entry_point() {
    let dim = 16;
    let (index, vectors) = seeded_index(300, dim);

    // Delete a large prefix; odds are the medoid entry point is in it
    index.delete(&(0..200u64).collect::<Vec<_>>());
    index.consolidate().unwrap();
    index.validate_graph(false).unwrap();

    let results = index.search(&vectors[250 * dim..251 * dim], 5).unwrap();
    assert_eq!(results.first().map(|r| r.id), Some(250));
}

#[test]
fn test_compact_reclaims_and_preserves_search() {
    let dim = 16;
    let (mut index, vectors) = seeded_index(600, dim);

    index.delete(&(0..200u64).collect::<Vec<_>>());
    index.consolidate().unwrap();
    let reclaimed = index.compact(128).unwrap();
    assert_eq!(reclaimed, 200);
    index.validate_graph(false).unwrap();
    assert_eq!(index.len(), 400);

    // Searches keep working over remapped node ids
    let mut found = 0;
    for probe in 300..340u64 {
        let row = &vectors[probe as usize * dim..(probe as usize + 1) * dim];
        let results = index.search(row, 1).unwrap();
        if results.first().map(|r| r.id) == Some(probe) {
            found += 1;
        }
    }
    assert!(found >= 38, "only {}/40 probes survive compaction", found);

    // Reclaimed slots are reused by subsequent inserts without growth
    let before_slots = index.adjacency_lists().len();
    let extra = random_vectors(100, dim);
    let extra_ids: Vec<u64> = (5000..5100).collect();
    index.add(&extra, &extra_ids).unwrap();
    assert_eq!(index.adjacency_lists().len(), before_slots + 100);
}

#[test]
fn test_compact_without_consolidate_keeps_referenced_tombstones() {
    let dim = 16;
    let (mut index, _) = seeded_index(300, dim);

    index.delete(&(0..50u64).collect::<Vec<_>>());
    // No consolidate: tombstones are still wired into live lists, so
    // compaction must leave the referenced ones in place
    index.compact(64).unwrap();
    index.validate_graph(true).unwrap();
    assert_eq!(index.len(), 250);
}

#[test]
fn test_insert_delete_consolidate_compact_scenario() {
    let dim = 16;
    let initial = 1000;
    let (mut index, _) = seeded_index(initial, dim);

    // Insert 1000 new vectors
    let new_vectors = random_vectors(1000, dim);
    let new_ids: Vec<u64> = (10_000..11_000).collect();
    let outcome = index.add(&new_vectors, &new_ids).unwrap();
    assert_eq!(outcome.added, 1000);

    // Delete 1000 older vectors
    let deleted: Vec<u64> = (0..1000u64).collect();
    let outcome = index.delete(&deleted);
    assert_eq!(outcome.deleted, 1000);

    index.consolidate().unwrap();
    index.compact(1000).unwrap();
    index.validate_graph(false).unwrap();

    // Exactly the survivors remain
    assert_eq!(index.len(), 1000);
    for id in &deleted {
        assert!(!index.has_id(*id));
    }
    for id in &new_ids {
        assert!(index.has_id(*id));
    }
    let all: HashSet<u64> = index.all_ids().into_iter().collect();
    assert_eq!(all.len(), 1000);
    assert_eq!(all, new_ids.iter().copied().collect());
}

#[test]
fn test_k_above_capacity_rejected_not_truncated() {
    let dim = 16;
    let (index, vectors) = seeded_index(100, dim);
    index
        .set_search_parameters(SearchParameters::uniform(5))
        .unwrap();
    let err = index.search(&vectors[0..dim], 10).unwrap_err();
    assert_eq!(err.error_code(), "CONFIG_ERROR");
}

#[test]
fn test_empty_index_searches_empty() {
    let index = DynamicVamanaIndex::new(config(8), build_params(8, 16)).unwrap();
    assert!(index.is_empty());
    let results = index.search(&[0.0; 8], 3).unwrap();
    assert!(results.is_empty());
    assert!(index.all_ids().is_empty());
}

#[test]
fn test_save_load_reproduces_dynamic_state() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("dynamic.knsd");

    let dim = 16;
    let (index, _) = seeded_index(400, dim);
    index.delete(&(10..60u64).collect::<Vec<_>>());

    index.save(&path).unwrap();
    let loaded = DynamicVamanaIndex::load(&path).unwrap();

    assert_eq!(loaded.len(), index.len());
    assert!(!loaded.has_id(20));
    assert!(loaded.has_id(100));

    let queries = random_vectors(20, dim);
    let (ids_a, dist_a) = index.search_batch(&queries, 5).unwrap();
    let (ids_b, dist_b) = loaded.search_batch(&queries, 5).unwrap();
    assert_eq!(ids_a, ids_b);
    assert_eq!(dist_a, dist_b);

    // The reloaded index stays fully mutable
    let extra = random_vectors(10, dim);
    let extra_ids: Vec<u64> = (9000..9010).collect();
    assert_eq!(loaded.add(&extra, &extra_ids).unwrap().added, 10);
    loaded.consolidate().unwrap();
    loaded.validate_graph(false).unwrap();
}

#[test]
fn test_concurrent_search_and_mutation() {
    use std::sync::Arc;
    use std::time::Duration;

    let dim = 16;
    let (index, _) = seeded_index(400, dim);
    let index = Arc::new(index);

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let index = Arc::clone(&index);
            std::thread::spawn(move || {
                let mut rng = rand::thread_rng();
                for i in 0..30 {
                    match (t + i) % 3 {
                        0 => {
                            let vector: Vec<f32> =
                                (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect();
                            let _ = index.search(&vector, 5);
                        }
                        1 => {
                            let id = 100_000 + t as u64 * 1000 + i as u64;
                            let vector: Vec<f32> =
                                (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect();
                            let _ = index.add(&vector, &[id]);
                        }
                        _ => {
                            let _ = index.delete(&[rng.gen_range(0..400u64)]);
                        }
                    }
                }
            })
        })
        .collect();

    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        for handle in handles {
            let _ = handle.join();
        }
        let _ = tx.send(());
    });
    assert!(
        rx.recv_timeout(Duration::from_secs(30)).is_ok(),
        "threads did not complete; probable deadlock"
    );
    index.consolidate().unwrap();
    index.validate_graph(false).unwrap();
}
