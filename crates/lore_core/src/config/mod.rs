use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
pub const DEFAULT_OPENAI_COMPAT_URL: &str = "https://api.groq.com/openai/v1";

/// Whole-system configuration, loaded from YAML. Every section is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub reasoning: ReasoningConfig,
    pub validation: ValidationConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Soft boundary in words.
    pub chunk_size: u32,
    /// Hard boundary in words (a single longer paragraph still stays whole).
    pub max_chunk_size: u32,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            max_chunk_size: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub min_distinct_chapters: usize,
    pub oversample_factor: usize,
    pub embedding_model: String,
    pub ollama_url: String,
    /// Per-request timeout for embedding calls, independent of the LLM's.
    pub timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 8,
            min_distinct_chapters: 3,
            oversample_factor: 3,
            embedding_model: "nomic-embed-text".to_string(),
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    Ollama,
    #[serde(alias = "groq", alias = "openai")]
    OpenaiCompatible,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReasoningConfig {
    pub provider: LlmProvider,
    pub model: String,
    pub temperature: f64,
    pub base_url: Option<String>,
    /// Environment variable holding the bearer key for hosted providers.
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Ollama,
            model: "llama3.1".to_string(),
            temperature: 0.2,
            base_url: None,
            api_key_env: "GROQ_API_KEY".to_string(),
            timeout_secs: 60,
        }
    }
}

impl ReasoningConfig {
    pub fn resolved_base_url(&self) -> &str {
        match (self.base_url.as_deref(), self.provider) {
            (Some(url), _) => url,
            (None, LlmProvider::Ollama) => DEFAULT_OLLAMA_URL,
            (None, LlmProvider::OpenaiCompatible) => DEFAULT_OPENAI_COMPAT_URL,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ValidationConfig {
    pub reject_if_confidence_below: f64,
    #[serde(alias = "min_evidence_count")]
    pub min_evidence: usize,
    pub quote_integrity: QuoteIntegrityConfig,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            reject_if_confidence_below: 0.4,
            min_evidence: 3,
            quote_integrity: QuoteIntegrityConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QuoteIntegrityConfig {
    pub must_match_source_substring: bool,
}

impl Default for QuoteIntegrityConfig {
    fn default() -> Self {
        Self {
            must_match_source_substring: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/corpus.sqlite"),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let raw = fs::read_to_string(path).map_err(|e| {
            AppError::new("CONFIG_READ_FAILED", "Failed to read configuration file")
                .with_details(format!("path={}; err={}", path.display(), e))
        })?;
        Self::from_yaml_str(&raw).map_err(|e| {
            let details = match e.details.as_deref() {
                Some(d) => format!("path={}; {d}", path.display()),
                None => format!("path={}", path.display()),
            };
            e.with_details(details)
        })
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, AppError> {
        let cfg: Config = if raw.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(raw).map_err(|e| {
                AppError::new("CONFIG_PARSE_FAILED", "Failed to parse YAML configuration")
                    .with_details(e.to_string())
            })?
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let invalid = |msg: &str, details: String| -> Result<(), AppError> {
            Err(AppError::new("CONFIG_INVALID", msg.to_string()).with_details(details))
        };

        let c = &self.chunking;
        if c.chunk_size == 0 || c.max_chunk_size == 0 {
            return invalid(
                "Chunk sizes must be positive",
                format!("chunk_size={}; max_chunk_size={}", c.chunk_size, c.max_chunk_size),
            );
        }
        if c.chunk_size > c.max_chunk_size {
            return invalid(
                "chunk_size must not exceed max_chunk_size",
                format!("chunk_size={}; max_chunk_size={}", c.chunk_size, c.max_chunk_size),
            );
        }

        let r = &self.retrieval;
        if r.top_k == 0 {
            return invalid("retrieval.top_k must be positive", "top_k=0".to_string());
        }
        if r.oversample_factor == 0 {
            return invalid(
                "retrieval.oversample_factor must be at least 1",
                "oversample_factor=0".to_string(),
            );
        }
        if r.embedding_model.trim().is_empty() {
            return invalid("retrieval.embedding_model is required", String::new());
        }
        if r.timeout_secs == 0 {
            return invalid("retrieval.timeout_secs must be positive", "timeout_secs=0".to_string());
        }

        let m = &self.reasoning;
        if m.model.trim().is_empty() {
            return invalid("reasoning.model is required", String::new());
        }
        if !(0.0..=2.0).contains(&m.temperature) {
            return invalid(
                "reasoning.temperature must be within [0, 2]",
                format!("temperature={}", m.temperature),
            );
        }
        if m.timeout_secs == 0 {
            return invalid("reasoning.timeout_secs must be positive", "timeout_secs=0".to_string());
        }

        let v = &self.validation;
        if !(0.0..=1.0).contains(&v.reject_if_confidence_below) {
            return invalid(
                "validation.reject_if_confidence_below must be within [0, 1]",
                format!("reject_if_confidence_below={}", v.reject_if_confidence_below),
            );
        }
        Ok(())
    }
}
