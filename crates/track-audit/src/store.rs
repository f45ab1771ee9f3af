//! Bounded, append-only audit log with best-effort durable persistence.

use crate::AuditStoreConfig;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::{mpsc, oneshot};
use track_diff::{compute_changes, DiffError};
use track_types::{
    Actor, AuditEntry, Clock, DurableStorage, EntityType, NewAuditEntry, SystemClock,
};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("diff failed: {0}")]
    Diff(#[from] DiffError),
    #[error("export failed: {0}")]
    Export(String),
}

pub(crate) struct StoreState {
    /// Most recent first.
    pub(crate) entries: VecDeque<AuditEntry>,
    next_seq: u64,
    last_timestamp: Option<DateTime<Utc>>,
}

enum WriterCommand {
    Write(Vec<AuditEntry>),
    Flush(oneshot::Sender<()>),
}

/// Append-only audit log keyed by (entity type, entity id).
///
/// `log` never suspends: the in-memory list is updated under a lock and the durable
/// write is handed to a background worker whose failures are logged and dropped.
pub struct AuditStore {
    config: AuditStoreConfig,
    state: RwLock<StoreState>,
    clock: Arc<dyn Clock>,
    writer: Option<mpsc::UnboundedSender<WriterCommand>>,
}

impl AuditStore {
    /// Store without a durable medium.
    pub fn in_memory(config: AuditStoreConfig) -> Self {
        Self {
            config,
            state: RwLock::new(StoreState {
                entries: VecDeque::new(),
                next_seq: 1,
                last_timestamp: None,
            }),
            clock: Arc::new(SystemClock),
            writer: None,
        }
    }

    /// Load the persisted log from `storage` and spawn the write-behind worker.
    ///
    /// An unreadable or corrupt blob yields an empty store. Must be called inside a tokio runtime.
    pub async fn open(config: AuditStoreConfig, storage: Arc<dyn DurableStorage>) -> Self {
        let mut entries = match storage.read().await {
            Ok(Some(entries)) => entries,
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(error = %e, "audit log unreadable, starting empty");
                Vec::new()
            }
        };
        entries.sort_by(|a, b| b.seq.cmp(&a.seq));
        entries.truncate(config.max_entries());
        let next_seq = entries.first().map(|e| e.seq + 1).unwrap_or(1);
        let last_timestamp = entries.iter().map(|e| e.timestamp).max();
        tracing::info!(entries = entries.len(), "audit log loaded");

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(storage, rx));

        Self {
            config,
            state: RwLock::new(StoreState {
                entries: entries.into(),
                next_seq,
                last_timestamp,
            }),
            clock: Arc::new(SystemClock),
            writer: Some(tx),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &AuditStoreConfig {
        &self.config
    }

    pub(crate) fn read_state(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a mutation. `actor = None` marks it system-initiated.
    ///
    /// `changes` is computed when both snapshots are supplied. A failed diff leaves the
    /// store untouched.
    pub fn log(&self, draft: NewAuditEntry, actor: Option<&Actor>) -> Result<AuditEntry, AuditError> {
        let changes = match (&draft.old_values, &draft.new_values) {
            (Some(old), Some(new)) => Some(compute_changes(Some(old), Some(new))?),
            _ => None,
        };

        let mut state = self.write_state();
        let now = self.clock.now();
        let timestamp = match state.last_timestamp {
            Some(last) if now < last => last,
            _ => now,
        };
        let seq = state.next_seq;
        state.next_seq += 1;
        state.last_timestamp = Some(timestamp);

        let entry = AuditEntry {
            id: Uuid::now_v7().to_string(),
            seq,
            entity_type: draft.entity_type,
            entity_id: draft.entity_id,
            action: draft.action,
            actor_id: actor.map(|a| a.id.clone()),
            actor_name: actor.map(|a| a.name.clone()),
            timestamp,
            old_values: draft.old_values,
            new_values: draft.new_values,
            changes,
            metadata: draft.metadata,
        };
        state.entries.push_front(entry.clone());
        while state.entries.len() > self.config.max_entries() {
            if let Some(evicted) = state.entries.pop_back() {
                tracing::debug!(id = %evicted.id, seq = evicted.seq, "audit entry evicted");
            }
        }
        self.schedule_persist(&state);
        drop(state);

        tracing::debug!(
            id = %entry.id,
            entity_type = %entry.entity_type,
            entity_id = %entry.entity_id,
            action = %entry.action,
            "audit entry recorded"
        );
        Ok(entry)
    }

    /// All entries for one entity, most recent first.
    pub fn get_entity_history(&self, entity_type: &EntityType, entity_id: &str) -> Vec<AuditEntry> {
        self.read_state()
            .entries
            .iter()
            .filter(|e| &e.entity_type == entity_type && e.entity_id == entity_id)
            .cloned()
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<AuditEntry> {
        self.read_state().entries.iter().find(|e| e.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.read_state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove entries strictly older than `older_than`; returns how many were removed.
    pub fn cleanup(&self, older_than: DateTime<Utc>) -> usize {
        let mut state = self.write_state();
        let before = state.entries.len();
        state.entries.retain(|e| e.timestamp >= older_than);
        let removed = before - state.entries.len();
        if removed > 0 {
            self.schedule_persist(&state);
        }
        drop(state);
        tracing::info!(removed, cutoff = %older_than, "audit cleanup");
        removed
    }

    /// Drop every entry. Sequence numbers keep increasing.
    pub fn clear(&self) {
        let mut state = self.write_state();
        state.entries.clear();
        self.schedule_persist(&state);
    }

    /// Run `persist` and record `draft` only if it succeeds.
    ///
    /// The persisted value is returned even when recording fails; the failure is logged.
    pub async fn audited<T, E, F>(
        &self,
        draft: NewAuditEntry,
        actor: Option<&Actor>,
        persist: F,
    ) -> Result<(T, Option<AuditEntry>), E>
    where
        F: Future<Output = Result<T, E>>,
    {
        let value = persist.await?;
        let entry = match self.log(draft, actor) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(error = %e, "mutation persisted but audit entry not recorded");
                None
            }
        };
        Ok((value, entry))
    }

    /// Wait until every durable write scheduled so far has been attempted.
    pub async fn flush(&self) {
        let Some(tx) = &self.writer else {
            return;
        };
        let (done_tx, done_rx) = oneshot::channel();
        if tx.send(WriterCommand::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    fn schedule_persist(&self, state: &StoreState) {
        if let Some(tx) = &self.writer {
            let snapshot: Vec<AuditEntry> = state.entries.iter().cloned().collect();
            if tx.send(WriterCommand::Write(snapshot)).is_err() {
                tracing::warn!("audit writer stopped, log kept in memory only");
            }
        }
    }
}

async fn run_writer(
    storage: Arc<dyn DurableStorage>,
    mut rx: mpsc::UnboundedReceiver<WriterCommand>,
) {
    while let Some(cmd) = rx.recv().await {
        let mut snapshot = match cmd {
            WriterCommand::Write(snapshot) => snapshot,
            WriterCommand::Flush(done) => {
                let _ = done.send(());
                continue;
            }
        };
        // Only the latest queued snapshot matters; stop coalescing at a flush barrier.
        let mut barrier = None;
        while let Ok(next) = rx.try_recv() {
            match next {
                WriterCommand::Write(newer) => snapshot = newer,
                WriterCommand::Flush(done) => {
                    barrier = Some(done);
                    break;
                }
            }
        }
        if let Err(e) = storage.write(&snapshot).await {
            tracing::warn!(error = %e, entries = snapshot.len(), "audit log not persisted");
        }
        if let Some(done) = barrier {
            let _ = done.send(());
        }
    }
}
