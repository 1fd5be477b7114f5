use super::{create_store, png_bytes, FakeExtractor};
use crate::embedding::{SearchEngine, SearchError};

/// Unit vector at the given cosine against [1, 0, 0].
fn at_cosine(c: f64) -> Vec<f64> {
    vec![c, (1.0 - c * c).sqrt(), 0.0]
}

#[test]
fn test_ranked_and_collapsed_per_media() {
    let (store, _tmp) = create_store(3);

    // media ids 1..=9 so the interesting ones land on 5 and 9
    for i in 1..=9u64 {
        store
            .create_media(&format!("{i}.jpg"), &format!("{i}-{i}.jpg"))
            .unwrap();
    }

    let e1 = store.append(at_cosine(0.92), 5).unwrap();
    store.append(at_cosine(0.71), 5).unwrap();
    let e3 = store.append(at_cosine(0.65), 9).unwrap();

    let engine = SearchEngine::new(store, 0.6);
    let matches = engine.search(&[1.0, 0.0, 0.0], None).unwrap();

    assert_eq!(matches.len(), 2);

    assert_eq!(matches[0].media_id, 5);
    assert_eq!(matches[0].embedding_id, e1);
    assert_eq!(matches[0].similarity, 92.0);
    assert_eq!(matches[0].filename, "5.jpg");

    assert_eq!(matches[1].media_id, 9);
    assert_eq!(matches[1].embedding_id, e3);
    assert_eq!(matches[1].similarity, 65.0);
}

#[test]
fn test_threshold_filters_low_scores() {
    let (store, _tmp) = create_store(3);
    let item = store.create_media("a.jpg", "1-a.jpg").unwrap();

    store.append(at_cosine(0.3), item.id).unwrap();

    let engine = SearchEngine::new(store.clone(), 0.6);
    assert!(matches!(
        engine.search(&[1.0, 0.0, 0.0], None),
        Err(SearchError::NoMatches)
    ));

    // per-request threshold override widens the net
    let matches = engine.search(&[1.0, 0.0, 0.0], Some(0.2)).unwrap();
    assert_eq!(matches.len(), 1);
}

#[test]
fn test_empty_store_is_no_matches() {
    let (store, _tmp) = create_store(3);
    let engine = SearchEngine::new(store, 0.6);

    assert!(matches!(
        engine.search(&[1.0, 0.0, 0.0], None),
        Err(SearchError::NoMatches)
    ));
}

#[test]
fn test_equal_scores_keep_insertion_order() {
    let (store, _tmp) = create_store(3);
    let a = store.create_media("a.jpg", "1-a.jpg").unwrap();
    let b = store.create_media("b.jpg", "2-b.jpg").unwrap();

    store.append(at_cosine(0.8), a.id).unwrap();
    store.append(at_cosine(0.8), b.id).unwrap();

    let engine = SearchEngine::new(store, 0.6);
    let matches = engine.search(&[1.0, 0.0, 0.0], None).unwrap();

    assert_eq!(matches.len(), 2);
    assert_eq!(matches[0].media_id, a.id);
    assert_eq!(matches[1].media_id, b.id);
}

#[test]
fn test_degenerate_stored_row_is_skipped() {
    let (store, _tmp) = create_store(3);
    let item = store.create_media("a.jpg", "1-a.jpg").unwrap();

    store.append(vec![0.0, 0.0, 0.0], item.id).unwrap();
    store.append(at_cosine(0.9), item.id).unwrap();

    let engine = SearchEngine::new(store, 0.6);
    let matches = engine.search(&[1.0, 0.0, 0.0], None).unwrap();

    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].similarity, 90.0);
}

#[test]
fn test_degenerate_query_is_rejected() {
    let (store, _tmp) = create_store(3);
    let engine = SearchEngine::new(store, 0.6);

    assert!(matches!(
        engine.search(&[0.0, 0.0, 0.0], None),
        Err(SearchError::DegenerateQuery)
    ));
}

#[test]
fn test_search_image_without_face_fails() {
    let (store, _tmp) = create_store(3);
    let engine = SearchEngine::new(store, 0.6);
    let extractor = FakeExtractor::empty(3);

    let result = engine.search_image(&extractor, &png_bytes(), None);
    assert!(matches!(result, Err(SearchError::NoFaceDetected)));
}

#[test]
fn test_search_image_uses_first_detected_face() {
    let (store, _tmp) = create_store(3);
    let item = store.create_media("a.jpg", "1-a.jpg").unwrap();
    store.append(vec![1.0, 0.0, 0.0], item.id).unwrap();

    // two faces in the query image; only the first drives the search
    let extractor = FakeExtractor::new(
        3,
        vec![vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]]],
    );

    let engine = SearchEngine::new(store, 0.6);
    let matches = engine.search_image(&extractor, &png_bytes(), None).unwrap();

    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].similarity, 100.0);
}

#[test]
fn test_undecodable_query_image_fails() {
    let (store, _tmp) = create_store(3);
    let engine = SearchEngine::new(store, 0.6);
    let extractor = FakeExtractor::empty(3);

    let result = engine.search_image(&extractor, b"not an image", None);
    assert!(matches!(result, Err(SearchError::Decode(_))));
}
