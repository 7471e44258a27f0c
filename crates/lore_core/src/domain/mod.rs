use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Prefix carried by every `rejection_reason` that reports a failure of the
/// system itself rather than a verdict about the claim.
pub const SYSTEM_ERROR_PREFIX: &str = "SYSTEM_ERROR";

/// A bounded, chapter-local slice of a story.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    pub chunk_id: String,
    pub story_id: String,
    pub chapter_label: String,
    pub paragraph_index: u32,
    pub text: String,
    pub word_count: u32,
    pub char_offset: u64,
}

impl Chunk {
    pub fn make_id(story_id: &str, chapter: u32, paragraph_index: u32) -> String {
        format!("{story_id}_ch{chapter}_p{paragraph_index}")
    }

    pub fn make_chapter_label(chapter: u32) -> String {
        format!("ch_{chapter}")
    }
}

/// One entry of a ranked candidate pool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvidenceSpan {
    pub quote_text: String,
    pub chapter_id: String,
    #[serde(default)]
    pub paragraph_index: Option<u32>,
    #[serde(alias = "source_node_id")]
    pub source_chunk_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Hypothesis {
    pub hypothesis_text: String,
    #[serde(default)]
    pub supporting_evidence: Vec<EvidenceSpan>,
    pub confidence_score: f64,
    #[serde(default)]
    pub is_contradicted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReasoningTrace {
    pub primary_hypothesis: Hypothesis,
    #[serde(default)]
    pub alternatives_considered: Vec<Hypothesis>,
    pub logical_steps: Vec<String>,
}

impl ReasoningTrace {
    pub const MIN_LOGICAL_STEPS: usize = 2;

    /// Schema rules serde cannot express: step count and confidence range.
    pub fn check_shape(&self) -> Result<(), AppError> {
        if self.logical_steps.len() < Self::MIN_LOGICAL_STEPS {
            return Err(AppError::new(
                "AI_TRACE_INVALID",
                "Reasoning must have at least 2 logical steps",
            )
            .with_details(format!("logical_steps={}", self.logical_steps.len())));
        }
        let all = std::iter::once(&self.primary_hypothesis).chain(self.alternatives_considered.iter());
        for h in all {
            if !(0.0..=1.0).contains(&h.confidence_score) {
                return Err(AppError::new(
                    "AI_TRACE_INVALID",
                    "Hypothesis confidence_score must be within [0, 1]",
                )
                .with_details(format!("confidence_score={}", h.confidence_score)));
            }
        }
        Ok(())
    }

    /// Minimal well-formed trace standing in for a trace the system could not obtain.
    pub fn placeholder(failure: &str) -> Self {
        Self {
            primary_hypothesis: Hypothesis {
                hypothesis_text: "Error".to_string(),
                supporting_evidence: Vec::new(),
                confidence_score: 0.0,
                is_contradicted: false,
            },
            alternatives_considered: Vec::new(),
            logical_steps: vec![
                "System error encountered".to_string(),
                failure.to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClassificationStatus {
    Success,
    Rejection,
    Contradiction,
}

/// Which stage narrowed a result away from `SUCCESS`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RejectedBy {
    /// The language model itself declared the evidence insufficient or contradictory.
    Model,
    /// A post-hoc validation gate failed.
    Validator,
    /// The claim could not be evaluated (retrieval, transport or schema failure).
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassificationResult {
    pub status: ClassificationStatus,
    pub target_class: Option<String>,
    pub confidence: f64,
    pub reasoning_trace: ReasoningTrace,
    pub rejection_reason: Option<String>,
    #[serde(default)]
    pub rejected_by: Option<RejectedBy>,
    /// Gate that failed during validation. Kept apart from `rejection_reason`
    /// so a model's own verdict survives a failing gate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_failure: Option<String>,
}

impl ClassificationResult {
    /// Terminal rejection for a failure of the system rather than of the claim.
    pub fn system_failure(err: &AppError) -> Self {
        let description = err.describe();
        Self {
            status: ClassificationStatus::Rejection,
            target_class: None,
            confidence: 0.0,
            reasoning_trace: ReasoningTrace::placeholder(&description),
            rejection_reason: Some(format!("{SYSTEM_ERROR_PREFIX} {description}")),
            rejected_by: Some(RejectedBy::System),
            validation_failure: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ClassificationStatus::Success
    }

    pub fn is_system_error(&self) -> bool {
        self.rejected_by == Some(RejectedBy::System)
            || self
                .rejection_reason
                .as_deref()
                .is_some_and(|r| r.starts_with(SYSTEM_ERROR_PREFIX))
    }

    /// Narrow to `REJECTION`. Never used to widen.
    pub fn rejected(mut self, by: RejectedBy, reason: impl Into<String>) -> Self {
        self.status = ClassificationStatus::Rejection;
        self.rejection_reason = Some(reason.into());
        self.rejected_by = Some(by);
        self
    }
}
