use pretty_assertions::assert_eq;
use tempfile::tempdir;

use lore_core::chunking::{chunk_story, story_stats};
use lore_core::corpus::{sha256_hex, CorpusStore, NewCorpusVersion};

const STORY_V1: &str = "Chapter 1\n\nEdmond sailed home.\n\nChapter 2\n\nHe was arrested at the feast.";
const STORY_V2: &str = "Chapter 1\n\nEdmond sailed home.\n\nChapter 2\n\nHe escaped the island.";

fn publish(store: &mut CorpusStore, text: &str, model: Option<&str>, created_at: &str) -> i64 {
    let chunks = chunk_story(text, "monte", 3, 5);
    let stats = story_stats(text);
    let vectors: Vec<Vec<f32>> = if model.is_some() {
        chunks
            .iter()
            .enumerate()
            .map(|(i, _)| vec![i as f32, 1.0, 0.5])
            .collect()
    } else {
        Vec::new()
    };
    store
        .publish_story(&NewCorpusVersion {
            story_id: "monte",
            source_sha256: sha256_hex(text.as_bytes()),
            created_at,
            stats: &stats,
            chunks: &chunks,
            embedding_model: model,
            vectors: &vectors,
        })
        .expect("publish")
}

#[test]
fn publish_then_load_round_trips_chunks_in_order() {
    let tmp = tempdir().unwrap();
    let mut store = CorpusStore::open(&tmp.path().join("corpus.sqlite")).expect("open");
    let version = publish(&mut store, STORY_V1, Some("nomic-embed-text"), "2026-01-01T00:00:00Z");

    let corpus = store.load_story("monte").expect("load").expect("present");
    assert_eq!(corpus.version_id, version);
    assert_eq!(corpus.chunks, chunk_story(STORY_V1, "monte", 3, 5));
    assert_eq!(corpus.vectors.len(), corpus.chunks.len());
    assert_eq!(corpus.vectors[1], vec![1.0, 1.0, 0.5]);
    assert_eq!(corpus.embedding_model.as_deref(), Some("nomic-embed-text"));
    assert_eq!(corpus.source_sha256, sha256_hex(STORY_V1.as_bytes()));
}

#[test]
fn republish_swaps_active_version_and_drops_old_rows() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("corpus.sqlite");
    let mut store = CorpusStore::open(&path).expect("open");
    let v1 = publish(&mut store, STORY_V1, Some("m"), "2026-01-01T00:00:00Z");

    // A second connection opened before the swap sees the new version afterwards.
    let reader = CorpusStore::open(&path).expect("reader");
    assert_eq!(reader.load_story("monte").unwrap().unwrap().version_id, v1);

    let v2 = publish(&mut store, STORY_V2, Some("m"), "2026-01-02T00:00:00Z");
    assert!(v2 > v1);

    let corpus = reader.load_story("monte").unwrap().unwrap();
    assert_eq!(corpus.version_id, v2);
    assert!(corpus.chunks.iter().any(|c| c.text.contains("escaped")));
    assert!(!corpus.chunks.iter().any(|c| c.text.contains("arrested")));

    let stories = store.list_stories().expect("list");
    assert_eq!(stories.len(), 1);
    assert_eq!(stories[0].version_id, v2);
    assert_eq!(stories[0].stats.total_chapters, 2);
    assert_eq!(stories[0].chunk_count as usize, corpus.chunks.len());
}

#[test]
fn reusable_vectors_are_keyed_by_text_hash_and_model() {
    let mut store = CorpusStore::open_in_memory().expect("open");
    publish(&mut store, STORY_V1, Some("m"), "2026-01-01T00:00:00Z");

    let reuse = store.reusable_vectors("monte", "m").expect("reuse");
    let first = &chunk_story(STORY_V1, "monte", 3, 5)[0];
    assert_eq!(reuse.get(&sha256_hex(first.text.as_bytes())), Some(&vec![0.0, 1.0, 0.5]));

    assert!(store.reusable_vectors("monte", "other-model").unwrap().is_empty());
    assert!(store.reusable_vectors("unknown", "m").unwrap().is_empty());
}

#[test]
fn unindexed_versions_load_without_vectors() {
    let mut store = CorpusStore::open_in_memory().expect("open");
    publish(&mut store, STORY_V1, None, "2026-01-01T00:00:00Z");
    let corpus = store.load_story("monte").unwrap().unwrap();
    assert!(corpus.vectors.is_empty());
    assert!(corpus.embedding_model.is_none());
    assert!(store.load_story("missing").unwrap().is_none());
}

#[test]
fn mismatched_vector_count_is_rejected_atomically() {
    let mut store = CorpusStore::open_in_memory().expect("open");
    let chunks = chunk_story(STORY_V1, "monte", 3, 5);
    let stats = story_stats(STORY_V1);
    let err = store
        .publish_story(&NewCorpusVersion {
            story_id: "monte",
            source_sha256: sha256_hex(STORY_V1.as_bytes()),
            created_at: "2026-01-01T00:00:00Z",
            stats: &stats,
            chunks: &chunks,
            embedding_model: Some("m"),
            vectors: &[vec![1.0]],
        })
        .expect_err("mismatch");
    assert_eq!(err.code, "CORPUS_PUBLISH_FAILED");
    assert!(store.load_story("monte").unwrap().is_none());
}
