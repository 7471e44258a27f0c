use lore_core::error::AppError;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Llm, LlmRequest};
use crate::http::post_json;
use crate::ollama::OllamaClient;

#[derive(Debug, Clone)]
pub struct OllamaLlm {
    client: OllamaClient,
}

impl OllamaLlm {
    pub fn new(client: OllamaClient) -> Self {
        Self { client }
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Clone, Serialize)]
struct ChatOptions {
    temperature: f64,
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a str>,
    options: ChatOptions,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

impl Llm for OllamaLlm {
    fn complete(&self, req: &LlmRequest<'_>) -> Result<String, AppError> {
        let url = format!("{}/api/chat", self.client.base_url());
        let body = ChatRequest {
            model: req.model_id,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: req.system_instruction,
                },
                ChatMessage {
                    role: "user",
                    content: req.user_prompt,
                },
            ],
            stream: false,
            format: req.json_mode.then_some("json"),
            options: ChatOptions {
                temperature: req.temperature,
            },
        };

        debug!(model = req.model_id, url = %url, "calling ollama chat");
        let request = ureq::post(&url).timeout(self.client.timeout());
        let v: ChatResponse = post_json(request, &body, "AI_LLM_FAILED", "Ollama chat")?;
        if v.message.content.trim().is_empty() {
            return Err(AppError::new("AI_LLM_FAILED", "Chat response was empty"));
        }
        Ok(v.message.content)
    }
}
