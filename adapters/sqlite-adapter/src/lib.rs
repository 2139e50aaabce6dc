//! sqlite-adapter — SQLite implementation of the `BlobStore` port.
//!
//! Purpose
//! - Keep the user collection across restarts without any external service.
//! - One row per key in a `blobs` table; `set` upserts.
//!
//! Notes
//! - Uses `rusqlite` with the `bundled` feature for portability.

use std::path::Path;
use std::sync::Mutex;

use domain::{BlobStore, CoreError};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

/// SQLite-backed blob store.
pub struct SqliteBlobStore {
    conn: Mutex<Connection>,
}

impl SqliteBlobStore {
    /// Open (or create) a SQLite database at the given path and ensure schema.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, CoreError> {
        let conn = Connection::open(path).map_err(map_sqerr)?;
        init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Construct from env var `DB_PATH` (defaults to `./data/profiles.db`).
    pub fn from_env() -> Result<Self, CoreError> {
        let path = std::env::var("DB_PATH").unwrap_or_else(|_| "./data/profiles.db".to_string());
        Self::open_creating_dirs(path)
    }

    /// Open at `path`, creating missing parent directories first.
    pub fn open_creating_dirs<P: AsRef<Path>>(path: P) -> Result<Self, CoreError> {
        if let Some(dir) = path.as_ref().parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)
                    .map_err(|e| CoreError::Repository(format!("create {}: {e}", dir.display())))?;
            }
        }
        Self::new(path)
    }

    /// Ephemeral database, mostly for tests.
    pub fn in_memory() -> Result<Self, CoreError> {
        let conn = Connection::open_in_memory().map_err(map_sqerr)?;
        init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }
}

fn init_schema(conn: &Connection) -> Result<(), CoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS blobs (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        "#,
    )
    .map_err(map_sqerr)
}

fn map_sqerr<E: std::fmt::Display>(e: E) -> CoreError { CoreError::Repository(format!("sqlite error: {e}")) }

impl BlobStore for SqliteBlobStore {
    fn get(&self, key: &str) -> Result<Option<String>, CoreError> {
        let conn = self.conn.lock().map_err(|_| CoreError::Repository("mutex poisoned".into()))?;
        conn.query_row("SELECT value FROM blobs WHERE key = ?1", params![key], |row| row.get(0))
            .optional()
            .map_err(map_sqerr)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CoreError> {
        let conn = self.conn.lock().map_err(|_| CoreError::Repository("mutex poisoned".into()))?;
        conn.execute(
            "INSERT INTO blobs(key, value) VALUES(?1, ?2) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )
        .map_err(map_sqerr)?;
        debug!(key, bytes = value.len(), "blob written");
        Ok(())
    }
}
