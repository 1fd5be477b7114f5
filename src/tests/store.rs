use std::sync::Arc;

use super::{create_store, TEST_EXTRACTOR_ID};
use crate::embedding::{EmbeddingStore, StoreError};
use crate::media;

#[test]
fn test_append_and_read_back_bit_identical() {
    let (store, _tmp) = create_store(4);
    let item = store.create_media("a.jpg", "1-a.jpg").unwrap();

    let vector = vec![0.1, -2.5e-17, 1.0 / 3.0, f64::MIN_POSITIVE];
    let id = store.append(vector.clone(), item.id).unwrap();

    let all = store.all_embeddings();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, id);
    assert_eq!(all[0].media_id, item.id);
    for (x, y) in vector.iter().zip(all[0].vector.iter()) {
        assert_eq!(x.to_bits(), y.to_bits());
    }
}

#[test]
fn test_append_unknown_media_fails() {
    let (store, _tmp) = create_store(3);

    let result = store.append(vec![1.0, 0.0, 0.0], 42);
    assert!(matches!(result, Err(StoreError::NotFound)));
    assert!(store.is_empty());
}

#[test]
fn test_append_wrong_dimension_fails() {
    let (store, _tmp) = create_store(3);
    let item = store.create_media("a.jpg", "1-a.jpg").unwrap();

    let result = store.append(vec![1.0, 0.0], item.id);
    assert!(matches!(
        result,
        Err(StoreError::DimensionMismatch { expected: 3, got: 2 })
    ));
}

#[test]
fn test_mark_processed_unknown_media_fails() {
    let (store, _tmp) = create_store(3);
    assert!(matches!(
        store.mark_processed(42),
        Err(StoreError::NotFound)
    ));
}

#[test]
fn test_mark_processed_twice_is_noop() {
    let (store, _tmp) = create_store(3);
    let item = store.create_media("a.jpg", "1-a.jpg").unwrap();

    store.mark_processed(item.id).unwrap();
    store.mark_processed(item.id).unwrap();
    assert!(store.media(item.id).unwrap().processed);
}

#[test]
fn test_store_reopen_loads_persisted_embeddings() {
    let tmp = tempfile::tempdir().unwrap();
    let csv_path = tmp.path().join("media.csv");
    let vectors_path = tmp.path().join("vectors.bin");

    let (first_id, media_id) = {
        let media_mgr = Arc::new(media::BackendCsv::load(csv_path.to_str().unwrap()).unwrap());
        let store =
            EmbeddingStore::open(media_mgr, vectors_path.clone(), TEST_EXTRACTOR_ID, 3).unwrap();
        let item = store.create_media("a.jpg", "1-a.jpg").unwrap();
        let id = store.append(vec![0.5, 0.25, -1.0], item.id).unwrap();
        (id, item.id)
    };

    let media_mgr = Arc::new(media::BackendCsv::load(csv_path.to_str().unwrap()).unwrap());
    let store = EmbeddingStore::open(media_mgr, vectors_path, TEST_EXTRACTOR_ID, 3).unwrap();

    let all = store.all_embeddings();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, first_id);
    assert_eq!(all[0].media_id, media_id);
    assert_eq!(all[0].vector, vec![0.5, 0.25, -1.0]);

    // fresh ids continue after the persisted ones
    let item = store.create_media("b.jpg", "2-b.jpg").unwrap();
    let next = store.append(vec![0.0, 1.0, 0.0], item.id).unwrap();
    assert!(next > first_id);
}

#[test]
fn test_concurrent_appends_lose_nothing() {
    let (store, _tmp) = create_store(3);

    const N: usize = 100;
    let mut media_ids = Vec::with_capacity(N);
    for i in 0..N {
        let item = store
            .create_media(&format!("{i}.jpg"), &format!("{i}-{i}.jpg"))
            .unwrap();
        media_ids.push(item.id);
    }

    let handles: Vec<_> = media_ids
        .into_iter()
        .map(|media_id| {
            let store = store.clone();
            std::thread::spawn(move || {
                let jitter: f64 = rand::random();
                store
                    .append(vec![media_id as f64, 1.0 + jitter, 0.0], media_id)
                    .unwrap()
            })
        })
        .collect();

    let mut ids: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(store.len(), N);

    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), N, "embedding ids must be unique");

    // every appended vector survived, none torn
    let all = store.all_embeddings();
    assert_eq!(all.len(), N);
    for embedding in &all {
        assert_eq!(embedding.vector[0], embedding.media_id as f64);
    }
}

#[test]
fn test_snapshot_is_insertion_ordered() {
    let (store, _tmp) = create_store(2);
    let item = store.create_media("a.jpg", "1-a.jpg").unwrap();

    for i in 0..5 {
        store.append(vec![i as f64, 0.5], item.id).unwrap();
    }

    let all = store.all_embeddings();
    let ids: Vec<u64> = all.iter().map(|e| e.id).collect();
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    assert_eq!(ids, sorted);
}
