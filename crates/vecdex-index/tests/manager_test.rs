//! Index manager tests against the usearch engine.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use rand::Rng;
use tempfile::TempDir;

use vecdex_index::{
    BufferView, IndexConfig, IndexError, IndexManager, Key, LoadMode, Metric, Precision, RawBuffer,
};

fn random_vectors(count: usize, dims: usize) -> Vec<f32> {
    let mut rng = rand::rng();
    (0..count * dims).map(|_| rng.random::<f32>()).collect()
}

fn wait_idle(manager: &IndexManager) {
    let deadline = Instant::now() + Duration::from_secs(30);
    while manager.is_indexing() {
        assert!(Instant::now() < deadline, "batch job did not finish");
        thread::sleep(Duration::from_millis(5));
    }
}

fn keys_of(manager: &IndexManager, query: &[f32], k: usize) -> Vec<Key> {
    manager
        .search(query, k, None)
        .unwrap()
        .iter()
        .map(|m| m.key)
        .collect()
}

#[test]
fn test_cosine_scenario() {
    let manager = IndexManager::create(IndexConfig::new(3)).unwrap();
    manager.add(1, &[1.0, 0.0, 0.0]).unwrap();
    manager.add(2, &[0.0, 1.0, 0.0]).unwrap();
    manager.add(3, &[1.0, 0.0, 0.01]).unwrap();

    assert_eq!(keys_of(&manager, &[1.0, 0.0, 0.0], 2), vec![1, 3]);
}

#[test]
fn test_zero_dimensions_rejected() {
    assert!(matches!(
        IndexManager::create(IndexConfig::new(0)),
        Err(IndexError::InvalidArgument(_))
    ));
}

#[test]
fn test_add_get_full_precision_exact() {
    let manager = IndexManager::create(IndexConfig::new(8).with_metric(Metric::L2Squared)).unwrap();
    let vectors = random_vectors(20, 8);
    for (key, vector) in vectors.chunks_exact(8).enumerate() {
        manager.add(key as Key, vector).unwrap();
    }
    for (key, vector) in vectors.chunks_exact(8).enumerate() {
        assert_eq!(manager.get_item_vector(key as Key).unwrap().unwrap(), vector.to_vec());
    }
}

#[test]
fn test_update_replaces_vector() {
    let manager = IndexManager::create(IndexConfig::new(3)).unwrap();
    manager.update(5, &[1.0, 0.0, 0.0]).unwrap();
    manager.update(5, &[0.0, 0.0, 1.0]).unwrap();
    assert_eq!(manager.len().unwrap(), 1);
    assert_eq!(manager.get_item_vector(5).unwrap(), Some(vec![0.0, 0.0, 1.0]));
}

#[test]
fn test_filtered_search_only_allowed() {
    let manager = IndexManager::create(IndexConfig::new(16)).unwrap();
    let vectors = random_vectors(200, 16);
    for (key, vector) in vectors.chunks_exact(16).enumerate() {
        manager.add(key as Key, vector).unwrap();
    }
    let allowed: Vec<Key> = (0..200).filter(|k| k % 7 == 0).collect();
    let results = manager.search(&vectors[..16], 10, Some(allowed.as_slice())).unwrap();
    assert!(!results.is_empty());
    assert!(results.len() <= 10);
    assert!(results.iter().all(|m| m.key % 7 == 0));
    assert!(results.windows(2).all(|w| w[0].distance <= w[1].distance));

    let none = manager.search(&vectors[..16], 10, Some(&[])).unwrap();
    assert!(none.is_empty());
}

#[test]
fn test_batch_grows_capacity() {
    let manager = IndexManager::create(IndexConfig::new(8)).unwrap();
    let keys: Vec<Key> = (0..1000).collect();
    let vectors = random_vectors(1000, 8);
    manager.add_batch(&keys, &vectors).unwrap();
    wait_idle(&manager);

    assert_eq!(manager.last_result().unwrap().count, 1000);
    assert_eq!(manager.len().unwrap(), 1000);
    assert!(manager.capacity().unwrap() >= 1000);
}

#[test]
fn test_save_load_roundtrip() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("roundtrip.usearch");
    let path = path.to_str().unwrap();

    let config = IndexConfig::new(12).with_metric(Metric::L2Squared);
    let original = IndexManager::create(config.clone()).unwrap();
    let vectors = random_vectors(300, 12);
    for (key, vector) in vectors.chunks_exact(12).enumerate() {
        original.add(key as Key, vector).unwrap();
    }
    original.save(path).unwrap();

    let restored = IndexManager::create(config).unwrap();
    restored.load(&format!("file://{}", path)).unwrap();
    assert_eq!(restored.len().unwrap(), 300);

    let probes = random_vectors(10, 12);
    for probe in probes.chunks_exact(12) {
        assert_eq!(keys_of(&original, probe, 5), keys_of(&restored, probe, 5));
    }
}

#[test]
fn test_traversal_paths_rejected() {
    let manager = IndexManager::create(IndexConfig::new(3)).unwrap();
    assert!(matches!(
        manager.save("/tmp/../etc/index.usearch"),
        Err(IndexError::SecurityViolation(_))
    ));
    assert!(matches!(
        manager.load("file://../index.usearch"),
        Err(IndexError::SecurityViolation(_))
    ));
}

#[test]
fn test_load_missing_file_is_persistence_error() {
    let temp = TempDir::new().unwrap();
    let missing = temp.path().join("missing.usearch");
    let manager = IndexManager::create(IndexConfig::new(3)).unwrap();
    manager.add(1, &[1.0, 0.0, 0.0]).unwrap();

    assert!(matches!(
        manager.load(missing.to_str().unwrap()),
        Err(IndexError::Persistence { .. })
    ));
    assert_eq!(manager.len().unwrap(), 1);
}

#[test]
fn test_load_keeps_configured_metric() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("l2.usearch");
    let path = path.to_str().unwrap();

    let l2 = IndexManager::create(IndexConfig::new(4).with_metric(Metric::L2Squared)).unwrap();
    let vectors = random_vectors(20, 4);
    for (key, vector) in vectors.chunks_exact(4).enumerate() {
        l2.add(key as Key, vector).unwrap();
    }
    l2.save(path).unwrap();

    let cosine = IndexManager::create(IndexConfig::new(4)).unwrap();
    cosine.add(100, &[1.0, 0.0, 0.0, 0.0]).unwrap();
    match cosine.load(path) {
        Err(IndexError::Persistence { path: reported, .. }) => assert_eq!(reported, path),
        other => panic!("expected persistence error, got {:?}", other),
    }
    assert_eq!(cosine.len().unwrap(), 1);
    assert_eq!(cosine.stats().unwrap().metric_name, "cos");
}

#[test]
fn test_search_k_far_above_count() {
    let manager = IndexManager::create(IndexConfig::new(3)).unwrap();
    assert!(manager.search(&[1.0, 0.0, 0.0], usize::MAX, None).unwrap().is_empty());

    manager.add(1, &[1.0, 0.0, 0.0]).unwrap();
    manager.add(2, &[0.0, 1.0, 0.0]).unwrap();
    manager.add(3, &[1.0, 0.0, 0.01]).unwrap();

    let results = manager.search(&[1.0, 0.0, 0.0], usize::MAX, None).unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].key, 1);

    let filtered = manager
        .search(&[1.0, 0.0, 0.0], 1_000_000_000, Some(&[2, 3]))
        .unwrap();
    assert!(!filtered.is_empty());
    assert!(filtered.iter().all(|m| m.key == 2 || m.key == 3));
}

#[test]
fn test_quantized_get_within_tolerance() {
    let config = IndexConfig::new(3).with_precision(Precision::Quantized);
    let manager = IndexManager::create(config).unwrap();
    manager.add(1, &[0.6, 0.8, 0.0]).unwrap();
    let stored = manager.get_item_vector(1).unwrap().unwrap();
    for (got, want) in stored.iter().zip([0.6f32, 0.8, 0.0]) {
        assert!((got - want).abs() < 0.02, "got {} want {}", got, want);
    }
    assert_eq!(
        manager.stats().unwrap().estimated_memory_bytes,
        3 + 192 + 1_048_576
    );
}

#[test]
fn test_load_vectors_from_file_blocking() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("vectors.bin");
    let vectors = random_vectors(64, 4);
    let bytes: Vec<u8> = vectors.iter().flat_map(|v| v.to_le_bytes()).collect();
    std::fs::write(&path, bytes).unwrap();

    let manager = IndexManager::create(IndexConfig::new(4).with_metric(Metric::L2Squared)).unwrap();
    let count = manager
        .load_vectors_from_file(path.to_str().unwrap(), LoadMode::Blocking)
        .unwrap();
    assert_eq!(count, 64);
    assert_eq!(manager.get_item_vector(63).unwrap().unwrap(), vectors[252..].to_vec());
}

#[test]
fn test_misaligned_buffer_leaves_index_unchanged() {
    let manager = IndexManager::create(IndexConfig::new(3)).unwrap();
    let words = [0u32; 4];
    // SAFETY: u8 has no alignment requirement and the length matches.
    let bytes = unsafe { std::slice::from_raw_parts(words.as_ptr().cast::<u8>(), 16) };
    let raw = RawBuffer::new(bytes).with_byte_offset(2).with_byte_length(12);

    let result = BufferView::<f32>::new(raw).and_then(|view| manager.add(1, &view));
    assert!(matches!(result, Err(IndexError::Alignment { .. })));
    assert_eq!(manager.len().unwrap(), 0);
}

#[test]
fn test_shared_across_threads_during_batch() {
    let manager = Arc::new(IndexManager::create(IndexConfig::new(8)).unwrap());
    let keys: Vec<Key> = (0..500).collect();
    manager.add_batch(&keys, &random_vectors(500, 8)).unwrap();

    let readers: Vec<_> = (0..3)
        .map(|_| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                for probe in random_vectors(20, 8).chunks_exact(8) {
                    let results = manager.search(probe, 5, None).unwrap();
                    assert!(results.len() <= 5);
                }
            })
        })
        .collect();
    for reader in readers {
        reader.join().unwrap();
    }

    wait_idle(&manager);
    assert_eq!(manager.len().unwrap(), 500);
    assert!(matches!(manager.last_result(), Ok(report) if report.count == 500));
}
