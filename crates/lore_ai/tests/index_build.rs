use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pretty_assertions::assert_eq;
use tempfile::tempdir;

use lore_ai::embeddings::Embedder;
use lore_ai::index::{build_story_index, IndexBuildInput, IndexRegistry, StoryIndex};
use lore_core::config::ChunkingConfig;
use lore_core::corpus::CorpusStore;
use lore_core::error::AppError;

/// Embeds text as counts of the letters a, e and o; counts calls.
#[derive(Default)]
struct VowelEmbedder {
    calls: AtomicUsize,
}

impl Embedder for VowelEmbedder {
    fn embed(&self, _model: &str, input: &str) -> Result<Vec<f32>, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let count = |c: char| input.chars().filter(|x| *x == c).count() as f32;
        Ok(vec![count('a'), count('e'), count('o')])
    }
}

struct RaggedEmbedder;

impl Embedder for RaggedEmbedder {
    fn embed(&self, _model: &str, input: &str) -> Result<Vec<f32>, AppError> {
        Ok(vec![1.0; 1 + input.len() % 2])
    }
}

const TEXT: &str = "Chapter 1\n\nA sailor came home.\n\nChapter 2\n\nHe was thrown into a dungeon.\n\nChapter 3\n\nHe found a treasure.";

fn chunking() -> ChunkingConfig {
    ChunkingConfig {
        chunk_size: 3,
        max_chunk_size: 6,
    }
}

#[test]
fn build_publishes_and_reuses_unchanged_vectors() {
    let tmp = tempdir().unwrap();
    let mut store = CorpusStore::open(&tmp.path().join("c.sqlite")).expect("open");
    let embedder = VowelEmbedder::default();
    let cfg = chunking();

    let input = IndexBuildInput {
        story_id: "monte",
        text: TEXT,
        created_at: "2026-01-01T00:00:00Z",
        chunking: &cfg,
        model: "vowels",
    };
    let (index, report) = build_story_index(&mut store, &embedder, &input).expect("build");
    assert_eq!(index.dims(), 3);
    assert_eq!(index.version_id(), Some(report.version_id));
    assert_eq!(report.embedded, index.len());
    assert_eq!(report.reused, 0);
    assert_eq!(report.stats.total_chapters, 3);

    let first_calls = embedder.calls.load(Ordering::SeqCst);
    let changed = TEXT.replace("treasure", "fortune");
    let input = IndexBuildInput {
        text: &changed,
        created_at: "2026-01-02T00:00:00Z",
        ..input
    };
    let (rebuilt, report) = build_story_index(&mut store, &embedder, &input).expect("rebuild");
    assert_eq!(report.embedded, 1);
    assert_eq!(report.reused, rebuilt.len() - 1);
    assert_eq!(embedder.calls.load(Ordering::SeqCst), first_calls + 1);

    let registry = IndexRegistry::new();
    assert_eq!(registry.load_from_store(&store, "vowels").unwrap(), 1);
    let loaded = registry.get("monte").expect("published");
    assert_eq!(loaded.as_ref(), &rebuilt);
    assert_eq!(registry.load_from_store(&store, "other").unwrap(), 0);
}

#[test]
fn dimension_mismatch_aborts_without_publishing() {
    let mut store = CorpusStore::open_in_memory().expect("open");
    let cfg = chunking();
    let err = build_story_index(
        &mut store,
        &RaggedEmbedder,
        &IndexBuildInput {
            story_id: "monte",
            text: TEXT,
            created_at: "2026-01-01T00:00:00Z",
            chunking: &cfg,
            model: "ragged",
        },
    )
    .expect_err("mismatch");
    assert_eq!(err.code, "AI_INDEX_BUILD_FAILED");
    assert!(store.load_story("monte").unwrap().is_none());
}

#[test]
fn empty_story_is_rejected() {
    let mut store = CorpusStore::open_in_memory().expect("open");
    let cfg = chunking();
    let err = build_story_index(
        &mut store,
        &VowelEmbedder::default(),
        &IndexBuildInput {
            story_id: "blank",
            text: "  \n\n ",
            created_at: "2026-01-01T00:00:00Z",
            chunking: &cfg,
            model: "vowels",
        },
    )
    .expect_err("empty");
    assert_eq!(err.code, "AI_INDEX_BUILD_FAILED");
}

#[test]
fn registry_swap_keeps_old_snapshot_alive_for_readers() {
    let registry = IndexRegistry::new();
    let chunk = |id: &str, text: &str| lore_core::domain::Chunk {
        chunk_id: id.to_string(),
        story_id: "s".to_string(),
        chapter_label: "ch_1".to_string(),
        paragraph_index: 0,
        text: text.to_string(),
        word_count: 1,
        char_offset: 0,
    };
    let v1 = StoryIndex::new("s", "m", vec![chunk("s_ch1_p0", "old")], vec![vec![1.0]]).unwrap();
    registry.publish(Arc::new(v1));
    let held = registry.get("s").unwrap();

    let v2 = StoryIndex::new("s", "m", vec![chunk("s_ch1_p0", "new")], vec![vec![1.0]]).unwrap();
    registry.publish(Arc::new(v2));

    fn first_text(index: &StoryIndex) -> Option<String> {
        index.entries().next().map(|(c, _)| c.text.clone())
    }
    assert_eq!(first_text(&held).as_deref(), Some("old"));
    assert_eq!(first_text(&registry.get("s").unwrap()).as_deref(), Some("new"));
    assert_eq!(registry.story_ids(), vec!["s".to_string()]);
}
