//! SQLite-backed content store

use super::ContentStore;
use crate::error::{PasteError, Result};
use crate::models::{NewContent, StoredContent};
use async_trait::async_trait;
use bytes::Bytes;
use rusqlite::types::ValueRef;
use rusqlite::{ffi, params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS content (
    key TEXT PRIMARY KEY,
    content BLOB,
    content_type TEXT,
    content_encoding TEXT,
    user_agent TEXT,
    ip_address TEXT
)";

const INSERT: &str = "INSERT INTO content (key, content, content_type, content_encoding, user_agent, ip_address) \
                      VALUES (?1, ?2, ?3, ?4, ?5, ?6)";

const SELECT: &str = "SELECT content, content_type, content_encoding FROM content WHERE key = ?1";

const SELECT_FULL: &str = "SELECT content, content_type, content_encoding, user_agent, ip_address \
                           FROM content WHERE key = ?1";

/// Content store over a single SQLite connection
///
/// rusqlite is blocking, so every statement runs on tokio's blocking pool.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database file and ensure the schema exists
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        info!("Opening SQLite content store at {:?}", path);
        let conn = tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&path)
                .map_err(|e| PasteError::ConfigError(format!("Failed to open database: {}", e)))?;
            Self::prepare(conn)
        })
        .await
        .map_err(|e| PasteError::InternalError(format!("Store open task failed: {}", e)))??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| PasteError::ConfigError(format!("Failed to open database: {}", e)))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(Self::prepare(conn)?)),
        })
    }

    fn prepare(conn: Connection) -> Result<Connection> {
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|e| PasteError::ConfigError(format!("Failed to set busy timeout: {}", e)))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| PasteError::ConfigError(format!("Failed to create schema: {}", e)))?;
        Ok(conn)
    }

    /// Run a closure against the connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| PasteError::InternalError("SQLite connection lock poisoned".to_string()))?;
            f(&guard)
        })
        .await
        .map_err(|e| PasteError::InternalError(format!("Store task failed: {}", e)))?
    }

    /// Full record including audit metadata
    pub async fn record(&self, key: &str) -> Result<Option<NewContent>> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            conn.query_row(SELECT_FULL, params![key], |row| {
                Ok(NewContent {
                    key: key.clone(),
                    content: read_bytes(row.get_ref(0)?),
                    content_type: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    content_encoding: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    user_agent: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                    ip_address: row.get(4)?,
                })
            })
            .optional()
            .map_err(|e| PasteError::StorageRead(e.to_string()))
        })
        .await
    }

    /// Number of stored records
    pub async fn count(&self) -> Result<u64> {
        self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM content", [], |row| row.get::<_, i64>(0))
                .map(|n| n as u64)
                .map_err(|e| PasteError::StorageRead(e.to_string()))
        })
        .await
    }
}

/// Read the content column whether it was written as BLOB or TEXT
fn read_bytes(value: ValueRef<'_>) -> Bytes {
    match value {
        ValueRef::Blob(b) | ValueRef::Text(b) => Bytes::copy_from_slice(b),
        ValueRef::Null => Bytes::new(),
        ValueRef::Integer(i) => Bytes::from(i.to_string()),
        ValueRef::Real(f) => Bytes::from(f.to_string()),
    }
}

/// Only key uniqueness failures count; NOT NULL or CHECK failures are
/// ordinary write errors
fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::ConstraintViolation
                && (e.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                    || e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE)
    )
}

#[async_trait]
impl ContentStore for SqliteStore {
    async fn insert(&self, record: &NewContent) -> Result<()> {
        let record = record.clone();
        self.with_conn(move |conn| {
            conn.execute(
                INSERT,
                params![
                    record.key,
                    &record.content[..],
                    record.content_type,
                    record.content_encoding,
                    record.user_agent,
                    record.ip_address,
                ],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    PasteError::KeyCollision(record.key.clone())
                } else {
                    PasteError::StorageWrite(e.to_string())
                }
            })?;
            debug!("Inserted {} ({} bytes)", record.key, record.content.len());
            Ok(())
        })
        .await
    }

    async fn lookup(&self, key: &str) -> Result<Option<StoredContent>> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            conn.query_row(SELECT, params![key], |row| {
                Ok(StoredContent {
                    content: read_bytes(row.get_ref(0)?),
                    content_type: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    content_encoding: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                })
            })
            .optional()
            .map_err(|e| PasteError::StorageRead(e.to_string()))
        })
        .await
    }
}
