use std::collections::BTreeSet;

use tracing::debug;

use crate::domain::{Chunk, ScoredChunk};

/// Pick at most `limit` chunks from a pool ranked by descending score.
///
/// Pass one walks the pool in rank order taking the best chunk of every
/// chapter not yet represented; pass two fills the remaining capacity by
/// rank, regardless of chapter. Ties keep input order. A pool poorer than
/// `min_distinct_chapters` is not an error; the shortfall is only logged.
pub fn select_evidence(
    candidates: &[ScoredChunk],
    limit: usize,
    min_distinct_chapters: usize,
) -> Vec<Chunk> {
    let mut selected: Vec<&Chunk> = Vec::with_capacity(limit.min(candidates.len()));
    let mut chosen_ids: BTreeSet<&str> = BTreeSet::new();
    let mut seen_chapters: BTreeSet<&str> = BTreeSet::new();

    for c in candidates {
        if selected.len() >= limit {
            break;
        }
        let chunk = &c.chunk;
        if seen_chapters.contains(chunk.chapter_label.as_str()) {
            continue;
        }
        if chosen_ids.insert(chunk.chunk_id.as_str()) {
            seen_chapters.insert(chunk.chapter_label.as_str());
            selected.push(chunk);
        }
    }

    for c in candidates {
        if selected.len() >= limit {
            break;
        }
        if chosen_ids.insert(c.chunk.chunk_id.as_str()) {
            selected.push(&c.chunk);
        }
    }

    if seen_chapters.len() < min_distinct_chapters {
        debug!(
            distinct_chapters = seen_chapters.len(),
            min_distinct_chapters,
            pool = candidates.len(),
            "candidate pool too narrow for chapter diversity"
        );
    }

    selected.into_iter().cloned().collect()
}

/// Size of the candidate pool to request so the diversity pass has material
/// to work with.
pub fn oversampled_pool_size(limit: usize, oversample_factor: usize) -> usize {
    limit.saturating_mul(oversample_factor.max(1))
}
