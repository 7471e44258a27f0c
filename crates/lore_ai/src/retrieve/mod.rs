use std::sync::Arc;

use lore_core::domain::ScoredChunk;
use lore_core::error::AppError;
use tracing::debug;

use crate::embeddings::Embedder;
use crate::index::IndexRegistry;

/// Source of relevance-ranked candidate chunks for a story.
pub trait CandidateSource: Send + Sync {
    /// At most `k` candidates in descending score order.
    fn candidates(&self, story_id: &str, query: &str, k: usize) -> Result<Vec<ScoredChunk>, AppError>;
}

/// Cosine-similarity ranking over the published story indexes.
pub struct VectorRanker {
    registry: Arc<IndexRegistry>,
    embedder: Arc<dyn Embedder>,
}

impl VectorRanker {
    pub fn new(registry: Arc<IndexRegistry>, embedder: Arc<dyn Embedder>) -> Self {
        Self { registry, embedder }
    }
}

impl CandidateSource for VectorRanker {
    fn candidates(&self, story_id: &str, query: &str, k: usize) -> Result<Vec<ScoredChunk>, AppError> {
        let q = query.trim();
        if q.is_empty() {
            return Err(AppError::new("AI_RETRIEVAL_FAILED", "Query must not be empty"));
        }

        let index = self.registry.get(story_id).ok_or_else(|| {
            AppError::new(
                "AI_INDEX_NOT_READY",
                "Story is not indexed; ingest it before querying",
            )
            .with_details(format!("story_id={story_id}"))
        })?;
        if index.is_empty() {
            return Err(AppError::new("AI_INDEX_NOT_READY", "Story index is empty")
                .with_details(format!("story_id={story_id}")));
        }

        let qv = self.embedder.embed(index.model(), q)?;
        if qv.len() != index.dims() {
            return Err(AppError::new(
                "AI_RETRIEVAL_FAILED",
                "Query embedding dims do not match index dims",
            )
            .with_details(format!("index_dims={}; query_dims={}", index.dims(), qv.len())));
        }
        let qnorm = norm(&qv);
        if !qnorm.is_normal() {
            return Err(AppError::new(
                "AI_RETRIEVAL_FAILED",
                "Query embedding norm is zero or not finite",
            ));
        }

        // Zero or overflowing vectors have no direction and are never ranked.
        let mut hits: Vec<ScoredChunk> = index
            .entries()
            .filter_map(|(chunk, v)| {
                cosine(&qv, qnorm, v).map(|score| ScoredChunk {
                    chunk: chunk.clone(),
                    score,
                })
            })
            .collect();

        // Stable sort: equal scores keep corpus order.
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);

        debug!(
            story_id,
            k,
            returned = hits.len(),
            top_score = hits.first().map(|h| h.score).unwrap_or(0.0),
            "ranked candidates"
        );
        Ok(hits)
    }
}

fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine of `v` against a query whose norm is already known; `None` when
/// `v` has no usable direction.
fn cosine(query: &[f32], query_norm: f32, v: &[f32]) -> Option<f32> {
    let v_norm = norm(v);
    if !v_norm.is_normal() {
        return None;
    }
    let dot: f32 = query.iter().zip(v).map(|(a, b)| a * b).sum();
    let score = dot / (query_norm * v_norm);
    score.is_finite().then_some(score)
}
