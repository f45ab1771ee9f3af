//! Durable back-ends for the audit log.

mod json_file;
mod memory;

#[cfg(feature = "sqlite")]
mod sqlite;

pub use json_file::JsonFileStorage;
pub use memory::MemoryStorage;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStorage;

use track_types::{AuditEntry, DurableIoError};

pub(crate) fn encode(entries: &[AuditEntry]) -> Result<String, DurableIoError> {
    serde_json::to_string(entries).map_err(|e| DurableIoError::Other(e.to_string()))
}

pub(crate) fn decode(blob: &str) -> Result<Vec<AuditEntry>, DurableIoError> {
    serde_json::from_str(blob).map_err(|e| DurableIoError::Corrupt(e.to_string()))
}
