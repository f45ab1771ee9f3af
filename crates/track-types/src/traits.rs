//! Collaborator traits consumed by the core, and their error types.

use crate::{Actor, AuditEntry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Best-effort durable medium for the audit log (a single key/value blob).
#[async_trait]
pub trait DurableStorage: Send + Sync {
    /// Read the persisted log. `Ok(None)` when nothing has been written yet.
    async fn read(&self) -> Result<Option<Vec<AuditEntry>>, DurableIoError>;

    /// Replace the persisted log with `entries` (most recent first).
    async fn write(&self, entries: &[AuditEntry]) -> Result<(), DurableIoError>;
}

/// Authoritative remote write of a stage move.
#[async_trait]
pub trait StagePersister: Send + Sync {
    async fn persist_stage_move(
        &self,
        entity_id: &str,
        target_stage_id: &str,
    ) -> Result<(), PersistenceFailure>;
}

/// Ambient identity used to attribute changes. `None` means system-initiated.
pub trait ActorProvider: Send + Sync {
    fn current_actor(&self) -> Option<Actor>;
}

/// Session actor fixed at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticActor(pub Option<Actor>);

impl ActorProvider for StaticActor {
    fn current_actor(&self) -> Option<Actor> {
        self.0.clone()
    }
}

/// Source of timestamps for new entries.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Used for replays and tests.
#[derive(Debug)]
pub struct ManualClock(std::sync::Mutex<DateTime<Utc>>);

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self(std::sync::Mutex::new(start))
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = at;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut guard = self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DurableIoError {
    #[error("durable storage io: {0}")]
    Io(#[from] std::io::Error),
    #[error("durable storage data: {0}")]
    Corrupt(String),
    #[error("durable storage error: {0}")]
    Other(String),
}

/// The remote write failed (including timeouts and transport errors).
#[derive(Debug, Clone, thiserror::Error)]
pub enum PersistenceFailure {
    #[error("remote rejected stage move ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("remote transport error: {0}")]
    Transport(String),
    #[error("remote call timed out")]
    Timeout,
}
