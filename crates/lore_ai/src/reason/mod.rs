use std::sync::Arc;

use lore_core::domain::{
    Chunk, ClassificationResult, ClassificationStatus, ReasoningTrace, RejectedBy,
};
use lore_core::error::AppError;
use serde_json::Value;
use tracing::{debug, warn};

use crate::llm::{Llm, LlmRequest};

pub mod prompts;

#[derive(Debug, Clone, PartialEq)]
pub struct ReasonOptions {
    pub model_id: String,
    pub temperature: f64,
}

/// A parsed model reply: the trace plus whatever verdict the model declared.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelVerdict {
    pub trace: ReasoningTrace,
    pub status: Option<ClassificationStatus>,
    pub rejection_reason: Option<String>,
}

/// Single-shot LLM call that turns evidence and a claim into a provisional
/// result. Never fails: any error becomes a system rejection.
pub struct Reasoner {
    llm: Arc<dyn Llm>,
}

impl Reasoner {
    pub fn new(llm: Arc<dyn Llm>) -> Self {
        Self { llm }
    }

    pub fn reason(&self, claim: &str, evidence: &[Chunk], opts: &ReasonOptions) -> ClassificationResult {
        match self.try_reason(claim, evidence, opts) {
            Ok(result) => result,
            Err(e) => {
                warn!(code = %e.code, error = %e.describe(), "reasoning failed; returning system rejection");
                ClassificationResult::system_failure(&e)
            }
        }
    }

    fn try_reason(
        &self,
        claim: &str,
        evidence: &[Chunk],
        opts: &ReasonOptions,
    ) -> Result<ClassificationResult, AppError> {
        let user_prompt = prompts::user_prompt(claim, evidence);
        let req = LlmRequest {
            model_id: &opts.model_id,
            system_instruction: prompts::SYSTEM_INSTRUCTION,
            user_prompt: &user_prompt,
            temperature: opts.temperature,
            json_mode: true,
        };
        debug!(model = %opts.model_id, evidence = evidence.len(), "requesting reasoning trace");
        let raw = self.llm.complete(&req)?;
        let verdict = parse_response(&raw)?;
        Ok(into_result(verdict))
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let t = raw.trim();
    let Some(rest) = t.strip_prefix("```") else {
        return t;
    };
    // Drop an optional language tag, which may share a line with the body.
    let tag = rest.bytes().take_while(u8::is_ascii_alphanumeric).count();
    let body = rest[tag..].trim();
    body.strip_suffix("```").unwrap_or(body).trim()
}

fn invalid(message: &str, details: impl Into<String>) -> AppError {
    AppError::new("AI_RESPONSE_INVALID", message.to_string()).with_details(details)
}

fn parse_status(v: &Value) -> Result<Option<ClassificationStatus>, AppError> {
    match v {
        Value::Null => Ok(None),
        Value::String(s) => match s.trim().to_ascii_uppercase().as_str() {
            "SUCCESS" => Ok(Some(ClassificationStatus::Success)),
            "REJECTION" => Ok(Some(ClassificationStatus::Rejection)),
            "CONTRADICTION" => Ok(Some(ClassificationStatus::Contradiction)),
            other => Err(invalid("Unknown status in model response", format!("status={other}"))),
        },
        other => Err(invalid("Status must be a string", format!("status={other}"))),
    }
}

/// Parse a model reply into a verdict, enforcing the trace schema.
///
/// The trace fields may sit at the top level or under `reasoning_trace`;
/// markdown code fences around the JSON are ignored.
pub fn parse_response(raw: &str) -> Result<ModelVerdict, AppError> {
    let body = strip_code_fence(raw);
    let mut root: Value = serde_json::from_str(body).map_err(|e| {
        let preview: String = body.chars().take(120).collect();
        invalid("Model response is not valid JSON", format!("err={e}; body={preview}"))
    })?;
    let Some(obj) = root.as_object_mut() else {
        return Err(invalid("Model response must be a JSON object", String::new()));
    };

    let status = parse_status(obj.get("status").unwrap_or(&Value::Null))?;
    let rejection_reason = obj
        .get("rejection_reason")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let trace_value = match obj.remove("reasoning_trace") {
        Some(nested @ Value::Object(_)) => nested,
        _ => root,
    };
    let trace: ReasoningTrace = serde_json::from_value(trace_value)
        .map_err(|e| invalid("Model response does not match the reasoning trace shape", e.to_string()))?;
    trace.check_shape()?;

    Ok(ModelVerdict {
        trace,
        status,
        rejection_reason,
    })
}

/// Provisional result from a verdict. An explicit model status wins; a
/// contradicted primary hypothesis without one counts as `CONTRADICTION`.
pub fn into_result(v: ModelVerdict) -> ClassificationResult {
    let primary = &v.trace.primary_hypothesis;
    let status = v.status.unwrap_or(if primary.is_contradicted {
        ClassificationStatus::Contradiction
    } else {
        ClassificationStatus::Success
    });
    let target = primary.hypothesis_text.trim();
    let target_class = (!target.is_empty()).then(|| target.to_string());
    let confidence = primary.confidence_score;

    let (rejection_reason, rejected_by) = match status {
        ClassificationStatus::Success => (None, None),
        ClassificationStatus::Rejection => (
            Some(
                v.rejection_reason
                    .unwrap_or_else(|| "Model judged the evidence insufficient".to_string()),
            ),
            Some(RejectedBy::Model),
        ),
        ClassificationStatus::Contradiction => (
            Some(
                v.rejection_reason
                    .unwrap_or_else(|| "Model found the claim contradicted by the evidence".to_string()),
            ),
            Some(RejectedBy::Model),
        ),
    };

    ClassificationResult {
        status,
        target_class,
        confidence,
        reasoning_trace: v.trace,
        rejection_reason,
        rejected_by,
        validation_failure: None,
    }
}
