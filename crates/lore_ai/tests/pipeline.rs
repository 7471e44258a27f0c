use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use pretty_assertions::assert_eq;
use serde_json::json;

use lore_ai::llm::{Llm, LlmRequest};
use lore_ai::pipeline::ConsistencyChecker;
use lore_ai::retrieve::CandidateSource;
use lore_core::config::Config;
use lore_core::domain::{Chunk, ClassificationStatus, RejectedBy, ScoredChunk};
use lore_core::error::AppError;

struct FixedSource {
    pool: Vec<ScoredChunk>,
    requested_k: AtomicUsize,
}

impl FixedSource {
    fn new(pool: Vec<ScoredChunk>) -> Self {
        Self {
            pool,
            requested_k: AtomicUsize::new(0),
        }
    }
}

impl CandidateSource for FixedSource {
    fn candidates(&self, story_id: &str, _query: &str, k: usize) -> Result<Vec<ScoredChunk>, AppError> {
        self.requested_k.store(k, Ordering::SeqCst);
        if story_id != "monte" {
            return Err(AppError::new("AI_INDEX_NOT_READY", "Story is not indexed")
                .with_details(format!("story_id={story_id}")));
        }
        Ok(self.pool.iter().take(k).cloned().collect())
    }
}

/// Quotes the first two evidence nodes it is shown, verbatim unless told to invent.
struct QuotingLlm {
    confidence: f64,
    fabricate: bool,
    calls: AtomicUsize,
}

impl QuotingLlm {
    fn new(confidence: f64, fabricate: bool) -> Self {
        Self {
            confidence,
            fabricate,
            calls: AtomicUsize::new(0),
        }
    }
}

impl Llm for QuotingLlm {
    fn complete(&self, req: &LlmRequest<'_>) -> Result<String, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut spans = Vec::new();
        for block in req.user_prompt.split("[Node ").skip(1).take(2) {
            let id = block.split(']').next().unwrap_or_default();
            let text = block.split_once("):\n").map(|(_, t)| t).unwrap_or_default();
            let first_line = text.lines().next().unwrap_or_default();
            let quote = if self.fabricate {
                "The sky was green.".to_string()
            } else {
                first_line.split_whitespace().take(3).collect::<Vec<_>>().join(" ")
            };
            spans.push(json!({
                "quote_text": quote,
                "chapter_id": "ch",
                "source_node_id": id,
            }));
        }
        Ok(json!({
            "primary_hypothesis": {
                "hypothesis_text": "consistent",
                "supporting_evidence": spans,
                "confidence_score": self.confidence,
            },
            "logical_steps": ["read", "decided"],
        })
        .to_string())
    }
}

/// Declines the claim outright with a low score.
struct DecliningLlm;

impl Llm for DecliningLlm {
    fn complete(&self, _req: &LlmRequest<'_>) -> Result<String, AppError> {
        Ok(json!({
            "status": "REJECTION",
            "rejection_reason": "Nothing in the evidence mentions his birthplace.",
            "primary_hypothesis": {
                "hypothesis_text": "unsupported",
                "supporting_evidence": [],
                "confidence_score": 0.1,
            },
            "logical_steps": ["searched for a birthplace", "found none"],
        })
        .to_string())
    }
}

fn pool() -> Vec<ScoredChunk> {
    let mut out = Vec::new();
    for (i, ch) in [1u32, 1, 1, 2, 3, 2, 4].iter().enumerate() {
        out.push(ScoredChunk {
            chunk: Chunk {
                chunk_id: format!("monte_ch{ch}_p{i}"),
                story_id: "monte".to_string(),
                chapter_label: format!("ch_{ch}"),
                paragraph_index: i as u32,
                text: format!("Passage number {i} of chapter {ch}."),
                word_count: 6,
                char_offset: 0,
            },
            score: 1.0 - i as f32 * 0.1,
        });
    }
    out
}

fn config() -> Config {
    let mut cfg = Config::default();
    cfg.retrieval.top_k = 4;
    cfg.retrieval.min_distinct_chapters = 3;
    cfg.retrieval.oversample_factor = 2;
    cfg.validation.min_evidence = 2;
    cfg
}

#[test]
fn grounded_answer_succeeds_with_diverse_evidence() {
    let source = Arc::new(FixedSource::new(pool()));
    let checker = ConsistencyChecker::new(source.clone(), Arc::new(QuotingLlm::new(0.9, false)), &config());

    let report = checker.query_report("monte", "Dantès sailed.");
    assert_eq!(report.result.status, ClassificationStatus::Success);
    assert_eq!(source.requested_k.load(Ordering::SeqCst), 8);

    let chapters: Vec<&str> = report.evidence.iter().map(|c| c.chapter_label.as_str()).collect();
    assert_eq!(chapters, vec!["ch_1", "ch_2", "ch_3", "ch_4"]);
}

#[test]
fn fabricated_quotes_are_rejected_by_the_validator() {
    let checker = ConsistencyChecker::new(
        Arc::new(FixedSource::new(pool())),
        Arc::new(QuotingLlm::new(0.9, true)),
        &config(),
    );
    let r = checker.query("monte", "The sky was green.");
    assert_eq!(r.status, ClassificationStatus::Rejection);
    assert_eq!(r.rejected_by, Some(RejectedBy::Validator));
    assert!(r.rejection_reason.unwrap().contains("Quote integrity"));
    assert!(r.validation_failure.unwrap().contains("Quote integrity"));
}

#[test]
fn low_confidence_is_rejected() {
    let checker = ConsistencyChecker::new(
        Arc::new(FixedSource::new(pool())),
        Arc::new(QuotingLlm::new(0.3, false)),
        &config(),
    );
    let r = checker.query("monte", "claim");
    assert_eq!(r.rejection_reason.as_deref(), Some("Confidence 0.3 below threshold 0.4"));
}

#[test]
fn model_rejection_survives_failing_gates() {
    let checker = ConsistencyChecker::new(Arc::new(FixedSource::new(pool())), Arc::new(DecliningLlm), &config());
    let r = checker.query("monte", "Dantès was born in Lyon.");
    assert_eq!(r.status, ClassificationStatus::Rejection);
    assert_eq!(r.rejected_by, Some(RejectedBy::Model));
    assert_eq!(
        r.rejection_reason.as_deref(),
        Some("Nothing in the evidence mentions his birthplace.")
    );
    assert_eq!(r.validation_failure.as_deref(), Some("Confidence 0.1 below threshold 0.4"));
    assert!(!r.is_system_error());
}

#[test]
fn retrieval_failures_skip_the_model() {
    let llm = Arc::new(QuotingLlm::new(0.9, false));
    let checker = ConsistencyChecker::new(Arc::new(FixedSource::new(pool())), llm.clone(), &config());
    let r = checker.query("unknown", "claim");
    assert!(r.is_system_error());
    assert!(r.rejection_reason.unwrap().contains("AI_INDEX_NOT_READY"));

    let empty = ConsistencyChecker::new(Arc::new(FixedSource::new(Vec::new())), llm.clone(), &config());
    let r = empty.query("monte", "claim");
    assert!(r.rejection_reason.unwrap().starts_with("SYSTEM_ERROR [AI_RETRIEVAL_EMPTY]"));
    assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn one_checker_serves_concurrent_queries() {
    let llm = Arc::new(QuotingLlm::new(0.9, false));
    let checker = Arc::new(ConsistencyChecker::new(
        Arc::new(FixedSource::new(pool())),
        llm.clone(),
        &config(),
    ));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let checker = Arc::clone(&checker);
            thread::spawn(move || checker.query("monte", &format!("claim {i}")))
        })
        .collect();
    for h in handles {
        assert_eq!(h.join().unwrap().status, ClassificationStatus::Success);
    }
    assert_eq!(llm.calls.load(Ordering::SeqCst), 8);
}
