use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::AppError;

/// Schema steps, applied in order and recorded by name in `schema_history`.
const MIGRATIONS: &[(&str, &str)] = &[(
    "0001_init.sql",
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/../../migrations/0001_init.sql")),
)];

/// Writers wait this long for the lock while a corpus version is published.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

fn sql_err(code: &'static str, message: &'static str) -> impl Fn(rusqlite::Error) -> AppError {
    move |e| AppError::new(code, message).with_details(e.to_string())
}

fn configure(conn: &Connection) -> Result<(), AppError> {
    conn.busy_timeout(BUSY_TIMEOUT)
        .map_err(sql_err("DB_OPEN_FAILED", "Failed to set SQLite busy timeout"))?;
    conn.pragma_update(None, "foreign_keys", true)
        .map_err(sql_err("DB_OPEN_FAILED", "Failed to enable foreign keys"))
}

pub fn open(path: &Path) -> Result<Connection, AppError> {
    let conn = Connection::open(path).map_err(|e| {
        AppError::new("DB_OPEN_FAILED", "Failed to open SQLite database")
            .with_details(format!("path={}; err={}", path.display(), e))
    })?;
    configure(&conn)?;
    // Readers keep their snapshot while a new corpus version is written.
    let mode: String = conn
        .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
        .map_err(sql_err("DB_OPEN_FAILED", "Failed to enable WAL journal mode"))?;
    debug!(path = %path.display(), journal_mode = %mode, "opened corpus database");
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection, AppError> {
    let conn = Connection::open_in_memory()
        .map_err(sql_err("DB_OPEN_FAILED", "Failed to open in-memory SQLite database"))?;
    configure(&conn)?;
    Ok(conn)
}

fn applied_migrations(conn: &Connection) -> Result<HashSet<String>, AppError> {
    let read_err = sql_err("DB_MIGRATIONS_QUERY_FAILED", "Failed to read schema history");
    let mut stmt = conn.prepare("SELECT name FROM schema_history").map_err(&read_err)?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(&read_err)?
        .collect::<Result<HashSet<_>, _>>()
        .map_err(&read_err)?;
    Ok(names)
}

/// Bring the schema up to date. Each step runs in its own transaction
/// together with its history row, so a failed step leaves no trace.
pub fn migrate(conn: &mut Connection) -> Result<(), AppError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_history (
            name TEXT PRIMARY KEY NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
        );",
    )
    .map_err(sql_err("DB_MIGRATIONS_TABLE_FAILED", "Failed to create schema history table"))?;

    let applied = applied_migrations(conn)?;
    for &(name, sql) in MIGRATIONS.iter().filter(|(name, _)| !applied.contains(*name)) {
        let step_err = |e: rusqlite::Error| {
            AppError::new("DB_MIGRATION_FAILED", format!("Migration {name} failed")).with_details(e.to_string())
        };
        let tx = conn.transaction().map_err(step_err)?;
        tx.execute_batch(sql).map_err(step_err)?;
        tx.execute("INSERT INTO schema_history(name) VALUES (?1)", [name])
            .map_err(step_err)?;
        tx.commit().map_err(step_err)?;
        info!(migration = name, "applied schema migration");
    }
    Ok(())
}

/// Name of the most recent migration recorded, if any.
pub fn schema_version(conn: &Connection) -> Result<Option<String>, AppError> {
    conn.query_row(
        "SELECT name FROM schema_history ORDER BY name DESC LIMIT 1",
        [],
        |row| row.get(0),
    )
    .optional()
    .map_err(sql_err("DB_MIGRATIONS_QUERY_FAILED", "Failed to read schema version"))
}
