use tracing::debug;

use crate::config::ValidationConfig;
use crate::domain::{Chunk, ClassificationResult, EvidenceSpan, RejectedBy};

/// Quotes are truncated to this many characters in rejection reasons.
const QUOTE_PREVIEW_CHARS: usize = 30;

/// Deterministic acceptance rules applied to a reasoning result.
///
/// Gates run in a fixed order and stop at the first failure:
/// confidence, then evidence count, then quote integrity. A failing gate
/// is recorded in `validation_failure`. A `REJECTION` or `CONTRADICTION`
/// the model declared keeps its status, tag and reason; anything else is
/// narrowed to `REJECTION` and tagged `validator`. A passing result is
/// returned as is, so nothing is ever promoted.
#[derive(Debug, Clone, PartialEq)]
pub struct Validator {
    min_confidence: f64,
    min_evidence_count: usize,
    require_quote_integrity: bool,
}

impl Validator {
    pub fn new(cfg: &ValidationConfig) -> Self {
        Self {
            min_confidence: cfg.reject_if_confidence_below,
            min_evidence_count: cfg.min_evidence,
            require_quote_integrity: cfg.quote_integrity.must_match_source_substring,
        }
    }

    pub fn validate(&self, result: &ClassificationResult, evidence: &[Chunk]) -> ClassificationResult {
        // A system failure carries a placeholder trace; re-checking it would
        // only overwrite the tagged reason.
        if result.rejected_by == Some(RejectedBy::System) {
            return result.clone();
        }

        let Some(failure) = self.first_failure(result, evidence) else {
            return result.clone();
        };
        debug!(%failure, rejected_by = ?result.rejected_by, "validation gate failed");

        // The model's own non-success verdict already names the reason.
        let mut out = if result.rejected_by == Some(RejectedBy::Model) && !result.is_success() {
            result.clone()
        } else {
            result.clone().rejected(RejectedBy::Validator, failure.clone())
        };
        out.validation_failure = Some(failure);
        out
    }

    fn first_failure(&self, result: &ClassificationResult, evidence: &[Chunk]) -> Option<String> {
        if result.confidence < self.min_confidence {
            return Some(format!(
                "Confidence {} below threshold {}",
                result.confidence, self.min_confidence
            ));
        }

        let spans = &result.reasoning_trace.primary_hypothesis.supporting_evidence;
        if spans.len() < self.min_evidence_count {
            return Some(format!(
                "Insufficient evidence: {} spans provided, required {}",
                spans.len(),
                self.min_evidence_count
            ));
        }

        if self.require_quote_integrity {
            for span in spans {
                if let Some(reason) = quote_integrity_failure(span, evidence) {
                    return Some(reason);
                }
            }
        }
        None
    }
}

/// `None` when the span quotes its cited chunk verbatim.
pub fn quote_integrity_failure(span: &EvidenceSpan, evidence: &[Chunk]) -> Option<String> {
    let preview = quote_preview(&span.quote_text);
    let Some(chunk) = evidence.iter().find(|c| c.chunk_id == span.source_chunk_id) else {
        return Some(format!(
            "Quote integrity failure: quote '{preview}' cites chunk {} which is not in the supplied evidence",
            span.source_chunk_id
        ));
    };
    if span.quote_text.is_empty() || !chunk.text.contains(span.quote_text.as_str()) {
        return Some(format!(
            "Quote integrity failure: fabricated quote '{preview}' is not a verbatim substring of chunk {}",
            chunk.chunk_id
        ));
    }
    None
}

fn quote_preview(quote: &str) -> String {
    if quote.chars().count() <= QUOTE_PREVIEW_CHARS {
        return quote.to_string();
    }
    let mut s: String = quote.chars().take(QUOTE_PREVIEW_CHARS).collect();
    s.push_str("...");
    s
}
