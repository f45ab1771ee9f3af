//! Scriptable persister for tests: no network.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Semaphore;
use track_types::{PersistenceFailure, StagePersister};

/// Records every call and answers from a script (default: success).
///
/// A gated mock holds each call until [`MockPersister::release`] hands out a permit,
/// which keeps moves in flight for as long as a test needs.
#[derive(Default)]
pub struct MockPersister {
    script: Mutex<VecDeque<Result<(), PersistenceFailure>>>,
    calls: Mutex<Vec<(String, String)>>,
    gate: Option<Arc<Semaphore>>,
}

impl MockPersister {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::default()
        }
    }

    /// Let `n` held calls (current or future) complete.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Queue a failure for the next unscripted call.
    pub fn fail_next(&self, failure: PersistenceFailure) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Err(failure));
    }

    pub fn succeed_next(&self) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Ok(()));
    }

    /// `(entity_id, target_stage_id)` pairs in call order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait::async_trait]
impl StagePersister for MockPersister {
    async fn persist_stage_move(
        &self,
        entity_id: &str,
        target_stage_id: &str,
    ) -> Result<(), PersistenceFailure> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((entity_id.to_string(), target_stage_id.to_string()));
        let outcome = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(Ok(()));
        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|e| PersistenceFailure::Transport(e.to_string()))?;
            permit.forget();
        }
        outcome
    }
}
