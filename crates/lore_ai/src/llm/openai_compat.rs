use std::time::Duration;

use lore_core::config::ReasoningConfig;
use lore_core::error::AppError;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Llm, LlmRequest};
use crate::http::post_json;

/// Client for hosted `/chat/completions` services (Groq, OpenAI and compatibles).
#[derive(Clone)]
pub struct OpenAiCompatLlm {
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl std::fmt::Debug for OpenAiCompatLlm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatLlm")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl OpenAiCompatLlm {
    pub fn new(base_url: &str, api_key: impl Into<String>, timeout: Duration) -> Result<Self, AppError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        if !base_url.starts_with("https://") && !base_url.starts_with("http://") {
            return Err(AppError::new("CONFIG_INVALID", "LLM base URL must be http(s)")
                .with_details(format!("base_url={base_url}")));
        }
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(AppError::new("AI_API_KEY_MISSING", "LLM API key is empty"));
        }
        Ok(Self {
            base_url,
            api_key,
            timeout,
        })
    }

    /// Build from config, reading the bearer key from `api_key_env`.
    pub fn from_config(cfg: &ReasoningConfig) -> Result<Self, AppError> {
        let key = std::env::var(&cfg.api_key_env).map_err(|_| {
            AppError::new("AI_API_KEY_MISSING", "LLM API key environment variable is not set")
                .with_details(format!("env={}", cfg.api_key_env))
        })?;
        Self::new(
            cfg.resolved_base_url(),
            key,
            Duration::from_secs(cfg.timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[derive(Debug, Clone, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Clone, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Clone, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

impl Llm for OpenAiCompatLlm {
    fn complete(&self, req: &LlmRequest<'_>) -> Result<String, AppError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = CompletionRequest {
            model: req.model_id,
            messages: vec![
                Message {
                    role: "system",
                    content: req.system_instruction,
                },
                Message {
                    role: "user",
                    content: req.user_prompt,
                },
            ],
            temperature: req.temperature,
            response_format: req.json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        debug!(model = req.model_id, url = %url, "calling chat completions");
        let request = ureq::post(&url)
            .timeout(self.timeout)
            .set("Authorization", &format!("Bearer {}", self.api_key));
        let v: CompletionResponse = post_json(request, &body, "AI_LLM_FAILED", "chat completions")?;
        let content = v
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(AppError::new("AI_LLM_FAILED", "Completion response was empty"));
        }
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_key_and_bad_scheme() {
        let t = Duration::from_secs(1);
        assert!(OpenAiCompatLlm::new("https://api.groq.com/openai/v1/", "k", t).is_ok());
        assert_eq!(
            OpenAiCompatLlm::new("https://api.groq.com/openai/v1", " ", t)
                .unwrap_err()
                .code,
            "AI_API_KEY_MISSING"
        );
        assert!(OpenAiCompatLlm::new("ftp://x", "k", t).is_err());
    }

    #[test]
    fn debug_output_hides_the_key() {
        let llm = OpenAiCompatLlm::new("https://example.test/v1", "secret-key", Duration::from_secs(1)).unwrap();
        assert_eq!(llm.base_url(), "https://example.test/v1");
        assert!(!format!("{llm:?}").contains("secret-key"));
    }

    #[test]
    fn request_body_asks_for_json_object() {
        let body = CompletionRequest {
            model: "m",
            messages: vec![Message { role: "user", content: "hi" }],
            temperature: 0.2,
            response_format: Some(ResponseFormat { kind: "json_object" }),
        };
        let v = serde_json::to_value(body).unwrap();
        assert_eq!(v["response_format"]["type"], "json_object");
        assert_eq!(v["messages"][0]["role"], "user");
    }
}
