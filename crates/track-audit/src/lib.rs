//! AuditStore: bounded append-only log of entity mutations, with search, summaries,
//! export and best-effort durable persistence.

mod config;
mod export;
mod query;
mod storage;
mod store;

pub use config::{AuditStoreConfig, DEFAULT_MAX_ENTRIES};
pub use query::{SUMMARY_RECENT, SYSTEM_ACTOR};
pub use storage::{JsonFileStorage, MemoryStorage};
pub use store::{AuditError, AuditStore};
pub use track_diff::DiffError;

#[cfg(feature = "sqlite")]
pub use storage::SqliteStorage;
