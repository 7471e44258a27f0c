use std::sync::Arc;

use lore_core::config::{Config, RetrievalConfig};
use lore_core::domain::{Chunk, ClassificationResult};
use lore_core::error::AppError;
use lore_core::select::{oversampled_pool_size, select_evidence};
use lore_core::validate::Validator;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::llm::Llm;
use crate::reason::{ReasonOptions, Reasoner};
use crate::retrieve::CandidateSource;

/// Final result together with the evidence it was judged against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryReport {
    pub result: ClassificationResult,
    pub evidence: Vec<Chunk>,
}

/// Rank, select, reason, validate. Holds no per-query state, so one checker
/// can serve many threads.
pub struct ConsistencyChecker {
    source: Arc<dyn CandidateSource>,
    reasoner: Reasoner,
    validator: Validator,
    retrieval: RetrievalConfig,
    options: ReasonOptions,
}

impl ConsistencyChecker {
    pub fn new(source: Arc<dyn CandidateSource>, llm: Arc<dyn Llm>, cfg: &Config) -> Self {
        Self {
            source,
            reasoner: Reasoner::new(llm),
            validator: Validator::new(&cfg.validation),
            retrieval: cfg.retrieval.clone(),
            options: ReasonOptions {
                model_id: cfg.reasoning.model.clone(),
                temperature: cfg.reasoning.temperature,
            },
        }
    }

    pub fn query(&self, story_id: &str, claim: &str) -> ClassificationResult {
        self.query_report(story_id, claim).result
    }

    pub fn query_report(&self, story_id: &str, claim: &str) -> QueryReport {
        let evidence = match self.gather_evidence(story_id, claim) {
            Ok(ev) => ev,
            Err(e) => {
                warn!(story_id, code = %e.code, error = %e.describe(), "retrieval failed; skipping reasoning");
                return QueryReport {
                    result: ClassificationResult::system_failure(&e),
                    evidence: Vec::new(),
                };
            }
        };

        let provisional = self.reasoner.reason(claim, &evidence, &self.options);
        debug!(story_id, status = ?provisional.status, confidence = provisional.confidence, "provisional result");

        let result = self.validator.validate(&provisional, &evidence);
        info!(
            story_id,
            status = ?result.status,
            rejected_by = ?result.rejected_by,
            confidence = result.confidence,
            evidence = evidence.len(),
            "claim classified"
        );
        QueryReport { result, evidence }
    }

    fn gather_evidence(&self, story_id: &str, claim: &str) -> Result<Vec<Chunk>, AppError> {
        let pool_size = oversampled_pool_size(self.retrieval.top_k, self.retrieval.oversample_factor);
        let pool = self.source.candidates(story_id, claim, pool_size)?;
        if pool.is_empty() {
            return Err(AppError::new(
                "AI_RETRIEVAL_EMPTY",
                "No candidate evidence found for the claim",
            )
            .with_details(format!("story_id={story_id}")));
        }
        let evidence = select_evidence(
            &pool,
            self.retrieval.top_k,
            self.retrieval.min_distinct_chapters,
        );
        debug!(story_id, pool = pool.len(), selected = evidence.len(), "selected evidence");
        Ok(evidence)
    }
}
