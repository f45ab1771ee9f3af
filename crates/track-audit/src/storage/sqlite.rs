//! SQLite key/value storage for the audit log blob.

use super::{decode, encode};
use async_trait::async_trait;
use std::path::Path;
use track_types::{AuditEntry, DurableIoError, DurableStorage};

const DEFAULT_KEY: &str = "audit_log";

/// Stores the serialized log under one key of a `kv_blobs` table.
pub struct SqliteStorage {
    conn: std::sync::Mutex<rusqlite::Connection>,
    key: String,
}

impl SqliteStorage {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, DurableIoError> {
        let conn =
            rusqlite::Connection::open(path).map_err(|e| DurableIoError::Other(e.to_string()))?;
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self, DurableIoError> {
        let conn = rusqlite::Connection::open_in_memory()
            .map_err(|e| DurableIoError::Other(e.to_string()))?;
        Self::init(conn)
    }

    fn init(conn: rusqlite::Connection) -> Result<Self, DurableIoError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv_blobs (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .map_err(|e| DurableIoError::Other(e.to_string()))?;
        Ok(Self {
            conn: std::sync::Mutex::new(conn),
            key: DEFAULT_KEY.to_string(),
        })
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    fn with_conn<T, F>(&self, f: F) -> Result<T, DurableIoError>
    where
        F: FnOnce(&rusqlite::Connection) -> Result<T, rusqlite::Error>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| DurableIoError::Other(format!("failed to acquire lock: {}", e)))?;
        f(&conn).map_err(|e| DurableIoError::Other(e.to_string()))
    }
}

#[async_trait]
impl DurableStorage for SqliteStorage {
    async fn read(&self) -> Result<Option<Vec<AuditEntry>>, DurableIoError> {
        let blob: Option<String> = self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT value FROM kv_blobs WHERE key = ?1")?;
            let mut rows = stmt.query(rusqlite::params![self.key])?;
            match rows.next()? {
                Some(row) => Ok(Some(row.get(0)?)),
                None => Ok(None),
            }
        })?;
        match blob {
            Some(b) => decode(&b).map(Some),
            None => Ok(None),
        }
    }

    async fn write(&self, entries: &[AuditEntry]) -> Result<(), DurableIoError> {
        let blob = encode(entries)?;
        let now = chrono::Utc::now().to_rfc3339();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO kv_blobs (key, value, updated_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![self.key, blob, now],
            )
        })?;
        Ok(())
    }
}
