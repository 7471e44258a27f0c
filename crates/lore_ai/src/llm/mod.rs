use lore_core::error::AppError;

/// One chat-style completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmRequest<'a> {
    pub model_id: &'a str,
    pub system_instruction: &'a str,
    pub user_prompt: &'a str,
    pub temperature: f64,
    /// Ask the service to constrain its output to a JSON object.
    pub json_mode: bool,
}

pub trait Llm: Send + Sync {
    fn complete(&self, req: &LlmRequest<'_>) -> Result<String, AppError>;
}

pub mod ollama_llm;
pub mod openai_compat;

/// Build the configured LLM client.
pub fn from_config(
    cfg: &lore_core::config::ReasoningConfig,
) -> Result<std::sync::Arc<dyn Llm>, AppError> {
    use lore_core::config::LlmProvider;

    match cfg.provider {
        LlmProvider::Ollama => {
            let client = crate::ollama::OllamaClient::new(cfg.resolved_base_url())?
                .with_timeout(std::time::Duration::from_secs(cfg.timeout_secs));
            Ok(std::sync::Arc::new(ollama_llm::OllamaLlm::new(client)))
        }
        LlmProvider::OpenaiCompatible => Ok(std::sync::Arc::new(
            openai_compat::OpenAiCompatLlm::from_config(cfg)?,
        )),
    }
}
