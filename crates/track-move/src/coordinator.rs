//! Optimistic stage moves: snapshot, apply, persist, then commit or roll back.

use crate::{CacheSnapshot, EntityCache};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;
use track_audit::AuditStore;
use track_types::{
    ActorProvider, AuditAction, AuditEntry, EntityType, FieldMap, NewAuditEntry,
    PersistenceFailure, StagePersister,
};

/// Where an entity's move currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovePhase {
    Idle,
    Snapshotting,
    Applied,
    Committed,
    RolledBack,
    /// Outcome-only: the entity was already in the target stage.
    Unchanged,
}

impl MovePhase {
    pub fn as_str(self) -> &'static str {
        match self {
            MovePhase::Idle => "idle",
            MovePhase::Snapshotting => "snapshotting",
            MovePhase::Applied => "applied",
            MovePhase::Committed => "committed",
            MovePhase::RolledBack => "rolled_back",
            MovePhase::Unchanged => "unchanged",
        }
    }
}

/// Result of a settled move. `phase` is `Committed`, or `Unchanged` when the entity was
/// already in the target stage and nothing was sent.
#[derive(Debug, Clone)]
pub struct MoveOutcome {
    pub entity_id: String,
    pub from_stage: Option<String>,
    pub to_stage: String,
    pub phase: MovePhase,
    pub audit_entry: Option<AuditEntry>,
}

#[derive(Debug, thiserror::Error)]
pub enum MoveError {
    #[error("stage move rolled back: {0}")]
    Persistence(#[from] PersistenceFailure),
    #[error("stage move task aborted: {0}")]
    Aborted(String),
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Entity type recorded on stage-move audit entries.
    pub entity_type: EntityType,
    /// Field name used in the audit entry's old/new values.
    pub stage_field: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            entity_type: EntityType::SERVICE_ORDER,
            stage_field: "stage_id".to_string(),
        }
    }
}

impl CoordinatorConfig {
    /// Read `TRACK_ENTITY_TYPE` and `TRACK_STAGE_FIELD`.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(v) = std::env::var("TRACK_ENTITY_TYPE") {
            if !v.trim().is_empty() {
                cfg.entity_type = EntityType::new(v.trim());
            }
        }
        if let Ok(v) = std::env::var("TRACK_STAGE_FIELD") {
            if !v.trim().is_empty() {
                cfg.stage_field = v.trim().to_string();
            }
        }
        cfg
    }
}

struct Inner {
    cache: Arc<EntityCache>,
    audit: Arc<AuditStore>,
    persister: Arc<dyn StagePersister>,
    actors: Arc<dyn ActorProvider>,
    config: CoordinatorConfig,
    queues: Mutex<HashMap<String, QueueTail>>,
    next_ticket: Mutex<u64>,
    phases: Mutex<HashMap<String, MovePhase>>,
}

/// Last move issued for an entity; the next move waits for `done` before it starts.
struct QueueTail {
    ticket: u64,
    done: oneshot::Receiver<()>,
}

/// Coordinates optimistic stage moves.
///
/// Moves of the same entity run one at a time in the order they were issued; moves of
/// different entities run concurrently. A move runs to completion on its own task once
/// issued, even if the caller stops waiting, including while it is still queued.
#[derive(Clone)]
pub struct StageMoveCoordinator {
    inner: Arc<Inner>,
}

impl StageMoveCoordinator {
    pub fn new(
        cache: Arc<EntityCache>,
        audit: Arc<AuditStore>,
        persister: Arc<dyn StagePersister>,
        actors: Arc<dyn ActorProvider>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                cache,
                audit,
                persister,
                actors,
                config,
                queues: Mutex::new(HashMap::new()),
                next_ticket: Mutex::new(0),
                phases: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn cache(&self) -> &Arc<EntityCache> {
        &self.inner.cache
    }

    /// Phase of the latest move for `entity_id`. `Committed` and `RolledBack` stay visible
    /// until the next move starts; `Idle` when no move has run.
    pub fn phase(&self, entity_id: &str) -> MovePhase {
        self.inner
            .phases
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(entity_id)
            .copied()
            .unwrap_or(MovePhase::Idle)
    }

    /// Move `entity_id` to `target_stage_id`.
    ///
    /// On success the cache keeps the new stage, touched views are flagged for refresh and
    /// one `STATUS_CHANGE` entry is recorded. On failure every cached view is restored and
    /// no entry is recorded.
    pub async fn move_to_stage(
        &self,
        entity_id: &str,
        target_stage_id: &str,
    ) -> Result<MoveOutcome, MoveError> {
        let (ticket, previous, done) = self.inner.enqueue(entity_id);
        let inner = Arc::clone(&self.inner);
        let entity_id = entity_id.to_string();
        let target = target_stage_id.to_string();
        let handle = tokio::spawn(async move {
            if let Some(previous) = previous {
                // Err means the previous task went away without signalling; it is over either way.
                let _ = previous.await;
            }
            let result = inner.run(&entity_id, &target).await;
            inner.dequeue(&entity_id, ticket);
            let _ = done.send(());
            result
        });
        handle
            .await
            .map_err(|e| MoveError::Aborted(e.to_string()))?
    }
}

impl Inner {
    /// Become the tail of the entity's queue. Returns this move's ticket, the signal of
    /// the move it must wait for, and the sender its successor will wait on.
    fn enqueue(
        &self,
        entity_id: &str,
    ) -> (u64, Option<oneshot::Receiver<()>>, oneshot::Sender<()>) {
        let ticket = {
            let mut next = self.next_ticket.lock().unwrap_or_else(PoisonError::into_inner);
            *next += 1;
            *next
        };
        let (tx, rx) = oneshot::channel();
        let previous = self
            .queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entity_id.to_string(), QueueTail { ticket, done: rx })
            .map(|tail| tail.done);
        (ticket, previous, tx)
    }

    /// Drop the queue entry if no later move was issued for the entity.
    fn dequeue(&self, entity_id: &str, ticket: u64) {
        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        if queues.get(entity_id).is_some_and(|t| t.ticket == ticket) {
            queues.remove(entity_id);
        }
    }

    #[cfg(test)]
    fn queued_entities(&self) -> usize {
        self.queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn set_phase(&self, entity_id: &str, phase: MovePhase) {
        tracing::debug!(entity_id, phase = phase.as_str(), "stage move phase");
        let mut phases = self.phases.lock().unwrap_or_else(PoisonError::into_inner);
        match phase {
            MovePhase::Idle | MovePhase::Unchanged => {
                phases.remove(entity_id);
            }
            _ => {
                phases.insert(entity_id.to_string(), phase);
            }
        }
    }

    async fn run(&self, entity_id: &str, target: &str) -> Result<MoveOutcome, MoveError> {
        self.set_phase(entity_id, MovePhase::Snapshotting);
        let Some(snapshot) = self.cache.begin_move(entity_id, target) else {
            self.set_phase(entity_id, MovePhase::Idle);
            tracing::debug!(entity_id, stage = target, "entity already in target stage");
            return Ok(MoveOutcome {
                entity_id: entity_id.to_string(),
                from_stage: Some(target.to_string()),
                to_stage: target.to_string(),
                phase: MovePhase::Unchanged,
                audit_entry: None,
            });
        };
        self.set_phase(entity_id, MovePhase::Applied);

        let from_stage = snapshot.from_stage().map(str::to_string);
        let draft = self.audit_draft(&snapshot, target);
        let actor = self.actors.current_actor();
        let result = self
            .audit
            .audited(
                draft,
                actor.as_ref(),
                self.persister.persist_stage_move(entity_id, target),
            )
            .await;

        match result {
            Ok(((), audit_entry)) => {
                self.cache.mark_needs_refresh(&snapshot);
                self.set_phase(entity_id, MovePhase::Committed);
                tracing::info!(
                    entity_id,
                    from = from_stage.as_deref().unwrap_or("-"),
                    to = target,
                    "stage move committed"
                );
                Ok(MoveOutcome {
                    entity_id: entity_id.to_string(),
                    from_stage,
                    to_stage: target.to_string(),
                    phase: MovePhase::Committed,
                    audit_entry,
                })
            }
            Err(failure) => {
                let views = snapshot.views();
                self.cache.restore(snapshot);
                self.set_phase(entity_id, MovePhase::RolledBack);
                tracing::warn!(
                    entity_id,
                    to = target,
                    views,
                    error = %failure,
                    "stage move rolled back"
                );
                Err(MoveError::Persistence(failure))
            }
        }
    }

    fn audit_draft(&self, snapshot: &CacheSnapshot, target: &str) -> NewAuditEntry {
        let field = &self.config.stage_field;
        let mut old_values = FieldMap::new();
        if let Some(from) = snapshot.from_stage() {
            old_values.insert(field.clone(), from.into());
        }
        let mut new_values = FieldMap::new();
        new_values.insert(field.clone(), target.into());
        NewAuditEntry::new(
            self.config.entity_type.clone(),
            snapshot.entity_id(),
            AuditAction::StatusChange,
        )
        .with_old(old_values)
        .with_new(new_values)
        .with_metadata("operation", "stage_move".into())
    }
}
