use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use lore_ai::embeddings::ollama_embed::OllamaEmbedder;
use lore_ai::embeddings::Embedder;
use lore_ai::index::{build_story_index, IndexBuildInput, IndexRegistry};
use lore_ai::llm;
use lore_ai::ollama::OllamaClient;
use lore_ai::pipeline::ConsistencyChecker;
use lore_ai::retrieve::VectorRanker;
use lore_core::batch::{predict_label, read_claims, write_predictions, Prediction};
use lore_core::chunking::chunk_story;
use lore_core::config::Config;
use lore_core::corpus::CorpusStore;
use lore_core::error::AppError;
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Serialize)]
pub struct IngestSummary {
    pub story_id: String,
    pub version_id: i64,
    pub chunks: usize,
    pub embedded: usize,
    pub reused: usize,
    pub total_chapters: u32,
    pub total_words: u64,
}

#[derive(Debug, Serialize)]
pub struct PredictSummary {
    pub rows: usize,
    pub predicted_consistent: usize,
    pub system_errors: usize,
    pub output: String,
}

/// Logs go to stderr so JSON on stdout stays machine-readable.
pub fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(l) => EnvFilter::try_new(l).unwrap_or_else(|_| EnvFilter::new("info")),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    // A second init (tests) is not an error worth surfacing.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}

pub fn load_config(path: Option<&Path>) -> Result<Config, AppError> {
    match path {
        Some(p) => Config::load(p),
        None => Ok(Config::default()),
    }
}

fn now_rfc3339_utc() -> Result<String, AppError> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|e| AppError::new("CLI_TIME_FAILED", "Failed to format time").with_details(e.to_string()))
}

/// `novel_The Count of Monte Cristo.txt` -> `The Count of Monte Cristo`.
pub fn story_id_from_path(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = name.strip_suffix(".txt").unwrap_or(&name);
    let name = name.strip_prefix("novel_").unwrap_or(name);
    name.trim().to_string()
}

/// UTF-8, falling back to Latin-1 for older plain-text editions.
pub fn decode_text(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => e.into_bytes().iter().map(|&b| char::from(b)).collect(),
    }
}

fn read_story(path: &Path) -> Result<String, AppError> {
    let bytes = fs::read(path).map_err(|e| {
        AppError::new("CLI_READ_FAILED", "Failed to read story file")
            .with_details(format!("path={}; err={}", path.display(), e))
    })?;
    Ok(decode_text(bytes))
}

fn open_store(cfg: &Config) -> Result<CorpusStore, AppError> {
    let path = &cfg.storage.db_path;
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|e| {
            AppError::new("DB_PATH_FAILED", "Failed to create database directory")
                .with_details(format!("path={}; err={}", dir.display(), e))
        })?;
    }
    CorpusStore::open(path)
}

fn embedder(cfg: &Config) -> Result<Arc<dyn Embedder>, AppError> {
    let client = OllamaClient::new(&cfg.retrieval.ollama_url)?
        .with_timeout(Duration::from_secs(cfg.retrieval.timeout_secs));
    Ok(Arc::new(OllamaEmbedder::new(client)))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let json = serde_json::to_string_pretty(value).map_err(|e| {
        AppError::new("CLI_OUTPUT_FAILED", "Failed to encode output").with_details(e.to_string())
    })?;
    let mut out = std::io::stdout().lock();
    writeln!(out, "{json}").map_err(|e| {
        AppError::new("CLI_OUTPUT_FAILED", "Failed to write output").with_details(e.to_string())
    })
}

pub fn cmd_ingest(cfg: &Config, files: &[impl AsRef<Path>]) -> Result<(), AppError> {
    let mut store = open_store(cfg)?;
    let embedder = embedder(cfg)?;
    let model = cfg.retrieval.embedding_model.as_str();

    let mut summaries = Vec::new();
    let mut failed = 0usize;
    for file in files {
        let path = file.as_ref();
        let story_id = story_id_from_path(path);
        let built = read_story(path).and_then(|text| {
            let created_at = now_rfc3339_utc()?;
            build_story_index(
                &mut store,
                embedder.as_ref(),
                &IndexBuildInput {
                    story_id: &story_id,
                    text: &text,
                    created_at: &created_at,
                    chunking: &cfg.chunking,
                    model,
                },
            )
        });
        match built {
            Ok((index, report)) => summaries.push(IngestSummary {
                story_id,
                version_id: report.version_id,
                chunks: index.len(),
                embedded: report.embedded,
                reused: report.reused,
                total_chapters: report.stats.total_chapters,
                total_words: report.stats.total_words,
            }),
            Err(e) => {
                failed += 1;
                warn!(story_id = %story_id, path = %path.display(), error = %e.describe(), "ingest failed");
            }
        }
    }
    print_json(&summaries)?;

    if failed > 0 {
        return Err(AppError::new("CLI_INGEST_FAILED", "Some stories failed to ingest")
            .with_details(format!("failed={failed}; succeeded={}", summaries.len())));
    }
    Ok(())
}

pub fn cmd_stories(cfg: &Config) -> Result<(), AppError> {
    let store = open_store(cfg)?;
    print_json(&store.list_stories()?)
}

pub fn build_checker(cfg: &Config) -> Result<ConsistencyChecker, AppError> {
    let store = open_store(cfg)?;
    let registry = Arc::new(IndexRegistry::new());
    registry.load_from_store(&store, &cfg.retrieval.embedding_model)?;
    let ranker = Arc::new(VectorRanker::new(registry, embedder(cfg)?));
    let llm = llm::from_config(&cfg.reasoning)?;
    Ok(ConsistencyChecker::new(ranker, llm, cfg))
}

pub fn cmd_query(cfg: &Config, story_id: &str, claim: &str, show_evidence: bool) -> Result<(), AppError> {
    let checker = build_checker(cfg)?;
    let report = checker.query_report(story_id.trim(), claim);
    if show_evidence {
        print_json(&report)
    } else {
        print_json(&report.result)
    }
}

pub fn cmd_predict(cfg: &Config, input: &Path, output: &Path) -> Result<(), AppError> {
    let file = fs::File::open(input).map_err(|e| {
        AppError::new("BATCH_READ_FAILED", "Failed to open claim CSV")
            .with_details(format!("path={}; err={}", input.display(), e))
    })?;
    let claims = read_claims(file)?;
    info!(rows = claims.len(), path = %input.display(), "loaded claims");

    let checker = build_checker(cfg)?;
    let mut predictions = Vec::with_capacity(claims.len());
    let mut system_errors = 0usize;
    for (i, row) in claims.iter().enumerate() {
        let result = checker.query(row.story_id(), &row.query_text());
        if result.is_system_error() {
            system_errors += 1;
        }
        let prediction = predict_label(&result);
        info!(
            row = i + 1,
            of = claims.len(),
            id = %row.id,
            status = ?result.status,
            prediction,
            "classified claim"
        );
        predictions.push(Prediction {
            id: row.id.clone(),
            prediction,
        });
    }

    let out = fs::File::create(output).map_err(|e| {
        AppError::new("BATCH_WRITE_FAILED", "Failed to create predictions CSV")
            .with_details(format!("path={}; err={}", output.display(), e))
    })?;
    write_predictions(out, &predictions)?;

    print_json(&PredictSummary {
        rows: predictions.len(),
        predicted_consistent: predictions.iter().filter(|p| p.prediction == 1).count(),
        system_errors,
        output: output.display().to_string(),
    })
}

pub fn cmd_chunk(cfg: &Config, file: &Path) -> Result<(), AppError> {
    let text = read_story(file)?;
    let chunks = chunk_story(
        &text,
        &story_id_from_path(file),
        cfg.chunking.chunk_size,
        cfg.chunking.max_chunk_size,
    );
    print_json(&chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    #[test]
    fn story_id_strips_prefix_and_extension() {
        assert_eq!(
            story_id_from_path(&PathBuf::from("data/novel_The Count of Monte Cristo.txt")),
            "The Count of Monte Cristo"
        );
        assert_eq!(
            story_id_from_path(&PathBuf::from("In Search of the Castaways.txt")),
            "In Search of the Castaways"
        );
        assert_eq!(story_id_from_path(&PathBuf::from("plain")), "plain");
    }

    #[test]
    fn latin1_bytes_are_decoded() {
        assert_eq!(decode_text(b"caf\xe9".to_vec()), "café");
        assert_eq!(decode_text("Dantès".as_bytes().to_vec()), "Dantès");
    }

    #[test]
    fn missing_config_path_uses_defaults() {
        assert_eq!(load_config(None).unwrap(), Config::default());
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("rules.yaml");
        fs::write(&p, "validation:\n  min_evidence: 5\n").unwrap();
        assert_eq!(load_config(Some(&p)).unwrap().validation.min_evidence, 5);
    }

    #[test]
    fn chunk_command_reads_latin1_files() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("novel_tale.txt");
        fs::write(&p, b"Chapter 1\n\nLe caf\xe9.").unwrap();
        let mut cfg = Config::default();
        cfg.storage.db_path = tmp.path().join("unused.sqlite");
        assert!(cmd_chunk(&cfg, &p).is_ok());
    }
}
