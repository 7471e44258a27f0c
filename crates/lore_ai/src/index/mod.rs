use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use lore_core::chunking::{chunk_story, story_stats, StoryStats};
use lore_core::config::ChunkingConfig;
use lore_core::corpus::{sha256_hex, CorpusStore, NewCorpusVersion, StoryCorpus};
use lore_core::domain::Chunk;
use lore_core::error::AppError;
use tracing::{debug, info, warn};

use crate::embeddings::Embedder;

/// Immutable, fully built vector index over one story's chunks.
#[derive(Debug, Clone, PartialEq)]
pub struct StoryIndex {
    story_id: String,
    version_id: Option<i64>,
    model: String,
    dims: usize,
    chunks: Vec<Chunk>,
    vectors: Vec<Vec<f32>>,
}

impl StoryIndex {
    /// Checks that vectors align with chunks and share one dimension.
    pub fn new(
        story_id: impl Into<String>,
        model: impl Into<String>,
        chunks: Vec<Chunk>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self, AppError> {
        let story_id = story_id.into();
        if chunks.len() != vectors.len() {
            return Err(AppError::new(
                "AI_INDEX_BUILD_FAILED",
                "Vector count does not match chunk count",
            )
            .with_details(format!(
                "story_id={story_id}; chunks={}; vectors={}",
                chunks.len(),
                vectors.len()
            )));
        }
        let dims = vectors.first().map(Vec::len).unwrap_or(0);
        for (c, v) in chunks.iter().zip(vectors.iter()) {
            if v.len() != dims {
                return Err(AppError::new(
                    "AI_INDEX_BUILD_FAILED",
                    "Embedding dimension mismatch across chunks",
                )
                .with_details(format!("expected={dims}; got={}; chunk_id={}", v.len(), c.chunk_id)));
            }
        }
        Ok(Self {
            story_id,
            version_id: None,
            model: model.into(),
            dims,
            chunks,
            vectors,
        })
    }

    pub fn from_corpus(corpus: StoryCorpus) -> Result<Self, AppError> {
        let Some(model) = corpus.embedding_model else {
            return Err(AppError::new(
                "AI_INDEX_NOT_READY",
                "Story corpus was published without embeddings; re-ingest it",
            )
            .with_details(format!("story_id={}", corpus.story_id)));
        };
        let mut idx = Self::new(corpus.story_id, model, corpus.chunks, corpus.vectors)?;
        idx.version_id = Some(corpus.version_id);
        Ok(idx)
    }

    pub fn story_id(&self) -> &str {
        &self.story_id
    }

    pub fn version_id(&self) -> Option<i64> {
        self.version_id
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Chunks paired with their vectors, in corpus order.
    pub fn entries(&self) -> impl Iterator<Item = (&Chunk, &[f32])> {
        self.chunks
            .iter()
            .zip(self.vectors.iter().map(Vec::as_slice))
    }
}

/// Published story indexes. Readers take an `Arc` snapshot; a publish
/// replaces the whole entry, so a query never sees a half-built index.
#[derive(Debug, Default)]
pub struct IndexRegistry {
    inner: RwLock<BTreeMap<String, Arc<StoryIndex>>>,
}

impl IndexRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, index: Arc<StoryIndex>) {
        let story_id = index.story_id().to_string();
        let chunks = index.len();
        let mut map = self.inner.write().unwrap_or_else(|p| p.into_inner());
        map.insert(story_id.clone(), index);
        debug!(story_id = %story_id, chunks, "published story index");
    }

    pub fn get(&self, story_id: &str) -> Option<Arc<StoryIndex>> {
        let map = self.inner.read().unwrap_or_else(|p| p.into_inner());
        map.get(story_id).cloned()
    }

    pub fn story_ids(&self) -> Vec<String> {
        let map = self.inner.read().unwrap_or_else(|p| p.into_inner());
        map.keys().cloned().collect()
    }

    /// Publish every stored story embedded with `model`; returns how many
    /// were loaded. Stories embedded with another model are skipped.
    pub fn load_from_store(&self, store: &CorpusStore, model: &str) -> Result<usize, AppError> {
        let mut loaded = 0usize;
        for summary in store.list_stories()? {
            if summary.embedding_model.as_deref() != Some(model) {
                warn!(
                    story_id = %summary.story_id,
                    stored_model = summary.embedding_model.as_deref().unwrap_or("<none>"),
                    model,
                    "skipping story indexed with a different embedding model"
                );
                continue;
            }
            let Some(corpus) = store.load_story(&summary.story_id)? else {
                continue;
            };
            self.publish(Arc::new(StoryIndex::from_corpus(corpus)?));
            loaded += 1;
        }
        info!(stories = loaded, model, "loaded story indexes");
        Ok(loaded)
    }
}

#[derive(Debug, Clone)]
pub struct IndexBuildInput<'a> {
    pub story_id: &'a str,
    pub text: &'a str,
    pub created_at: &'a str,
    pub chunking: &'a ChunkingConfig,
    pub model: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexBuildReport {
    pub version_id: i64,
    pub stats: StoryStats,
    pub embedded: usize,
    pub reused: usize,
}

/// Chunk and embed a story, publish it to the store as a new version, and
/// return the in-memory index for it. Nothing is written unless every chunk
/// embedded successfully with a consistent dimension.
pub fn build_story_index(
    store: &mut CorpusStore,
    embedder: &dyn Embedder,
    input: &IndexBuildInput<'_>,
) -> Result<(StoryIndex, IndexBuildReport), AppError> {
    let chunks = chunk_story(
        input.text,
        input.story_id,
        input.chunking.chunk_size,
        input.chunking.max_chunk_size,
    );
    if chunks.is_empty() {
        return Err(AppError::new(
            "AI_INDEX_BUILD_FAILED",
            "Story has no chunkable text",
        )
        .with_details(format!("story_id={}", input.story_id)));
    }
    let stats = story_stats(input.text);

    let reusable = store.reusable_vectors(input.story_id, input.model)?;
    let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());
    let mut dims: Option<usize> = None;
    let mut embedded = 0usize;
    let mut reused = 0usize;

    for chunk in chunks.iter() {
        let v = match reusable.get(&sha256_hex(chunk.text.as_bytes())) {
            Some(v) => {
                reused += 1;
                v.clone()
            }
            None => {
                embedded += 1;
                embedder.embed(input.model, &chunk.text).map_err(|e| {
                    AppError::new("AI_EMBEDDINGS_FAILED", "Failed to compute embeddings")
                        .with_details(format!("chunk_id={}; err={}", chunk.chunk_id, e))
                        .with_retryable(e.retryable)
                })?
            }
        };
        match dims {
            Some(d) if d != v.len() => {
                return Err(AppError::new(
                    "AI_INDEX_BUILD_FAILED",
                    "Embedding dimension mismatch across chunks",
                )
                .with_details(format!(
                    "expected={d}; got={}; chunk_id={}",
                    v.len(),
                    chunk.chunk_id
                )));
            }
            Some(_) => {}
            None => dims = Some(v.len()),
        }
        vectors.push(v);
    }

    let version_id = store.publish_story(&NewCorpusVersion {
        story_id: input.story_id,
        source_sha256: sha256_hex(input.text.as_bytes()),
        created_at: input.created_at,
        stats: &stats,
        chunks: &chunks,
        embedding_model: Some(input.model),
        vectors: &vectors,
    })?;

    info!(
        story_id = input.story_id,
        version_id,
        chunks = chunks.len(),
        embedded,
        reused,
        "built story index"
    );

    let mut index = StoryIndex::new(input.story_id, input.model, chunks, vectors)?;
    index.version_id = Some(version_id);
    Ok((
        index,
        IndexBuildReport {
            version_id,
            stats,
            embedded,
            reused,
        },
    ))
}
