use std::collections::BTreeMap;
use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::chunking::StoryStats;
use crate::db;
use crate::domain::Chunk;
use crate::error::AppError;

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Everything needed to publish one rebuilt story corpus.
#[derive(Debug, Clone)]
pub struct NewCorpusVersion<'a> {
    pub story_id: &'a str,
    pub source_sha256: String,
    pub created_at: &'a str,
    pub stats: &'a StoryStats,
    pub chunks: &'a [Chunk],
    /// Model that produced `vectors`; `None` publishes chunks without an index.
    pub embedding_model: Option<&'a str>,
    /// Empty, or one vector per chunk in the same order.
    pub vectors: &'a [Vec<f32>],
}

/// The active version of one story, read as a single consistent snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct StoryCorpus {
    pub version_id: i64,
    pub story_id: String,
    pub source_sha256: String,
    pub embedding_model: Option<String>,
    pub chunks: Vec<Chunk>,
    /// Aligned with `chunks`; empty when the version was published unindexed.
    pub vectors: Vec<Vec<f32>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorySummary {
    pub story_id: String,
    pub version_id: i64,
    pub chunk_count: u32,
    pub embedding_model: Option<String>,
    pub created_at: String,
    pub stats: StoryStats,
}

fn db_err(code: &str, message: &str) -> impl FnOnce(rusqlite::Error) -> AppError {
    let code = code.to_string();
    let message = message.to_string();
    move |e| AppError::new(code, message).with_details(e.to_string())
}

/// Versioned chunk corpus backed by SQLite.
///
/// Each publish writes a complete new version and flips the story's active
/// pointer inside one transaction, so a reader on another connection sees
/// either the previous chunk set or the new one, never a mix.
pub struct CorpusStore {
    conn: Connection,
}

impl CorpusStore {
    pub fn open(path: &Path) -> Result<Self, AppError> {
        let mut conn = db::open(path)?;
        db::migrate(&mut conn)?;
        let schema = db::schema_version(&conn)?.unwrap_or_default();
        info!(path = %path.display(), schema = %schema, "opened corpus store");
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, AppError> {
        let mut conn = db::open_in_memory()?;
        db::migrate(&mut conn)?;
        Ok(Self { conn })
    }

    pub fn publish_story(&mut self, input: &NewCorpusVersion<'_>) -> Result<i64, AppError> {
        if !input.vectors.is_empty() && input.vectors.len() != input.chunks.len() {
            return Err(AppError::new(
                "CORPUS_PUBLISH_FAILED",
                "Vector count does not match chunk count",
            )
            .with_details(format!(
                "chunks={}; vectors={}",
                input.chunks.len(),
                input.vectors.len()
            )));
        }
        if !input.vectors.is_empty() && input.embedding_model.is_none() {
            return Err(AppError::new(
                "CORPUS_PUBLISH_FAILED",
                "Vectors were supplied without an embedding model",
            ));
        }

        let tx = self
            .conn
            .transaction()
            .map_err(db_err("DB_TX_FAILED", "Failed to start publish transaction"))?;

        tx.execute(
            "INSERT INTO corpus_versions(story_id, source_sha256, embedding_model, created_at,
               total_chapters, total_paragraphs, total_words, total_chars)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                input.story_id,
                input.source_sha256,
                input.embedding_model,
                input.created_at,
                input.stats.total_chapters as i64,
                input.stats.total_paragraphs as i64,
                input.stats.total_words as i64,
                input.stats.total_chars as i64,
            ],
        )
        .map_err(db_err("CORPUS_PUBLISH_FAILED", "Failed to insert corpus version"))?;
        let version_id = tx.last_insert_rowid();

        {
            let mut insert_chunk = tx
                .prepare(
                    "INSERT INTO chunks(version_id, chunk_id, ordinal, story_id, chapter_label,
                       paragraph_index, text, text_sha256, word_count, char_offset)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                )
                .map_err(db_err("CORPUS_PUBLISH_FAILED", "Failed to prepare chunk insert"))?;
            let mut insert_vector = tx
                .prepare(
                    "INSERT INTO chunk_vectors(version_id, chunk_id, vector_json) VALUES (?1, ?2, ?3)",
                )
                .map_err(db_err("CORPUS_PUBLISH_FAILED", "Failed to prepare vector insert"))?;

            for (ordinal, chunk) in input.chunks.iter().enumerate() {
                insert_chunk
                    .execute(params![
                        version_id,
                        chunk.chunk_id,
                        ordinal as i64,
                        chunk.story_id,
                        chunk.chapter_label,
                        chunk.paragraph_index as i64,
                        chunk.text,
                        sha256_hex(chunk.text.as_bytes()),
                        chunk.word_count as i64,
                        chunk.char_offset as i64,
                    ])
                    .map_err(|e| {
                        AppError::new("CORPUS_PUBLISH_FAILED", "Failed to insert chunk")
                            .with_details(format!("chunk_id={}; err={}", chunk.chunk_id, e))
                    })?;

                if let Some(v) = input.vectors.get(ordinal) {
                    let json = serde_json::to_string(v).map_err(|e| {
                        AppError::new("CORPUS_PUBLISH_FAILED", "Failed to encode chunk vector")
                            .with_details(e.to_string())
                    })?;
                    insert_vector
                        .execute(params![version_id, chunk.chunk_id, json])
                        .map_err(db_err("CORPUS_PUBLISH_FAILED", "Failed to insert chunk vector"))?;
                }
            }
        }

        tx.execute(
            "INSERT INTO active_versions(story_id, version_id) VALUES (?1, ?2)
             ON CONFLICT(story_id) DO UPDATE SET version_id = excluded.version_id",
            params![input.story_id, version_id],
        )
        .map_err(db_err("CORPUS_PUBLISH_FAILED", "Failed to activate corpus version"))?;

        tx.execute(
            "DELETE FROM corpus_versions WHERE story_id = ?1 AND version_id <> ?2",
            params![input.story_id, version_id],
        )
        .map_err(db_err("CORPUS_PUBLISH_FAILED", "Failed to remove superseded versions"))?;

        tx.commit()
            .map_err(db_err("DB_TX_FAILED", "Failed to commit corpus version"))?;

        info!(
            story_id = input.story_id,
            version_id,
            chunks = input.chunks.len(),
            indexed = !input.vectors.is_empty(),
            "published corpus version"
        );
        Ok(version_id)
    }

    fn active_version(conn: &Connection, story_id: &str) -> Result<Option<i64>, AppError> {
        conn.query_row(
            "SELECT version_id FROM active_versions WHERE story_id = ?1",
            [story_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_err("CORPUS_READ_FAILED", "Failed to read active corpus version"))
    }

    pub fn load_story(&self, story_id: &str) -> Result<Option<StoryCorpus>, AppError> {
        // One read transaction so the version pointer and its rows agree.
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(db_err("DB_TX_FAILED", "Failed to start read transaction"))?;

        let Some(version_id) = Self::active_version(&tx, story_id)? else {
            return Ok(None);
        };

        let (source_sha256, embedding_model): (String, Option<String>) = tx
            .query_row(
                "SELECT source_sha256, embedding_model FROM corpus_versions WHERE version_id = ?1",
                [version_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(db_err("CORPUS_READ_FAILED", "Failed to read corpus version"))?;

        let chunks = {
            let mut stmt = tx
                .prepare(
                    "SELECT chunk_id, story_id, chapter_label, paragraph_index, text, word_count, char_offset
                     FROM chunks WHERE version_id = ?1 ORDER BY ordinal ASC",
                )
                .map_err(db_err("CORPUS_READ_FAILED", "Failed to prepare chunk query"))?;
            let rows = stmt
                .query_map([version_id], |row| {
                    Ok(Chunk {
                        chunk_id: row.get(0)?,
                        story_id: row.get(1)?,
                        chapter_label: row.get(2)?,
                        paragraph_index: row.get::<_, i64>(3)? as u32,
                        text: row.get(4)?,
                        word_count: row.get::<_, i64>(5)? as u32,
                        char_offset: row.get::<_, i64>(6)? as u64,
                    })
                })
                .map_err(db_err("CORPUS_READ_FAILED", "Failed to query chunks"))?;
            let chunks = rows
                .collect::<Result<Vec<_>, _>>()
                .map_err(db_err("CORPUS_READ_FAILED", "Failed to read chunk row"))?;
            chunks
        };

        let mut by_id: BTreeMap<String, Vec<f32>> = BTreeMap::new();
        {
            let mut stmt = tx
                .prepare("SELECT chunk_id, vector_json FROM chunk_vectors WHERE version_id = ?1")
                .map_err(db_err("CORPUS_READ_FAILED", "Failed to prepare vector query"))?;
            let rows = stmt
                .query_map([version_id], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
                .map_err(db_err("CORPUS_READ_FAILED", "Failed to query vectors"))?;
            for r in rows {
                let (chunk_id, json) =
                    r.map_err(db_err("CORPUS_READ_FAILED", "Failed to read vector row"))?;
                let v: Vec<f32> = serde_json::from_str(&json).map_err(|e| {
                    AppError::new("CORPUS_READ_FAILED", "Failed to decode chunk vector")
                        .with_details(format!("chunk_id={chunk_id}; err={e}"))
                })?;
                by_id.insert(chunk_id, v);
            }
        }

        let vectors = if by_id.is_empty() {
            Vec::new()
        } else {
            let mut out = Vec::with_capacity(chunks.len());
            for c in chunks.iter() {
                let v = by_id.remove(&c.chunk_id).ok_or_else(|| {
                    AppError::new("CORPUS_CORRUPT", "Indexed corpus version is missing a chunk vector")
                        .with_details(format!("version_id={version_id}; chunk_id={}", c.chunk_id))
                })?;
                out.push(v);
            }
            out
        };

        Ok(Some(StoryCorpus {
            version_id,
            story_id: story_id.to_string(),
            source_sha256,
            embedding_model,
            chunks,
            vectors,
        }))
    }

    /// Vectors of the active version keyed by chunk text hash, so a rebuild
    /// only embeds text that changed. Empty when the model differs.
    pub fn reusable_vectors(
        &self,
        story_id: &str,
        model: &str,
    ) -> Result<BTreeMap<String, Vec<f32>>, AppError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT c.text_sha256, v.vector_json
                 FROM active_versions a
                 JOIN corpus_versions cv ON cv.version_id = a.version_id
                 JOIN chunks c ON c.version_id = a.version_id
                 JOIN chunk_vectors v ON v.version_id = c.version_id AND v.chunk_id = c.chunk_id
                 WHERE a.story_id = ?1 AND cv.embedding_model = ?2",
            )
            .map_err(db_err("CORPUS_READ_FAILED", "Failed to prepare reusable vector query"))?;
        let rows = stmt
            .query_map(params![story_id, model], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(db_err("CORPUS_READ_FAILED", "Failed to query reusable vectors"))?;

        let mut out = BTreeMap::new();
        for r in rows {
            let (hash, json) = r.map_err(db_err("CORPUS_READ_FAILED", "Failed to read vector row"))?;
            // Undecodable rows are simply re-embedded.
            if let Ok(v) = serde_json::from_str::<Vec<f32>>(&json) {
                out.insert(hash, v);
            }
        }
        Ok(out)
    }

    pub fn list_stories(&self) -> Result<Vec<StorySummary>, AppError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT a.story_id, a.version_id, cv.embedding_model, cv.created_at,
                        cv.total_chapters, cv.total_paragraphs, cv.total_words, cv.total_chars,
                        (SELECT COUNT(*) FROM chunks c WHERE c.version_id = a.version_id)
                 FROM active_versions a
                 JOIN corpus_versions cv ON cv.version_id = a.version_id
                 ORDER BY a.story_id ASC",
            )
            .map_err(db_err("CORPUS_READ_FAILED", "Failed to prepare story listing"))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(StorySummary {
                    story_id: row.get(0)?,
                    version_id: row.get(1)?,
                    embedding_model: row.get(2)?,
                    created_at: row.get(3)?,
                    stats: StoryStats {
                        total_chapters: row.get::<_, i64>(4)? as u32,
                        total_paragraphs: row.get::<_, i64>(5)? as u32,
                        total_words: row.get::<_, i64>(6)? as u64,
                        total_chars: row.get::<_, i64>(7)? as u64,
                    },
                    chunk_count: row.get::<_, i64>(8)? as u32,
                })
            })
            .map_err(db_err("CORPUS_READ_FAILED", "Failed to list stories"))?;
        let stories = rows
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err("CORPUS_READ_FAILED", "Failed to read story row"))?;
        Ok(stories)
    }
}
