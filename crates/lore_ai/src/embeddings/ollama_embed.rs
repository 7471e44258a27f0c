use lore_core::error::AppError;
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::Embedder;
use crate::http::post_json;
use crate::ollama::OllamaClient;

/// Paragraph text past this many characters is dropped before embedding.
const EMBED_CHAR_LIMIT: usize = 12_000;

/// Embeds text through a local Ollama `/api/embeddings` endpoint.
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: OllamaClient,
}

impl OllamaEmbedder {
    pub fn new(client: OllamaClient) -> Self {
        Self { client }
    }
}

#[derive(Serialize)]
struct EmbedBody<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbedReply {
    #[serde(default)]
    embedding: Vec<f32>,
}

fn clip(text: &str) -> &str {
    text.char_indices()
        .nth(EMBED_CHAR_LIMIT)
        .map_or(text, |(cut, _)| &text[..cut])
}

impl Embedder for OllamaEmbedder {
    fn embed(&self, model: &str, input: &str) -> Result<Vec<f32>, AppError> {
        let prompt = clip(input);
        trace!(model, chars = prompt.len(), "embedding text");
        let request = ureq::post(&format!("{}/api/embeddings", self.client.base_url()))
            .timeout(self.client.timeout());
        let reply: EmbedReply = post_json(
            request,
            &EmbedBody { model, prompt },
            "AI_EMBEDDINGS_FAILED",
            "Ollama embeddings",
        )?;
        if reply.embedding.is_empty() {
            return Err(AppError::new("AI_EMBEDDINGS_FAILED", "Ollama returned an empty embedding")
                .with_details(format!("model={model}")));
        }
        Ok(reply.embedding)
    }
}
