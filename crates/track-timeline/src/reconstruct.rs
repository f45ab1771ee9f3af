//! Replay stage assignments into visits.

use crate::TimelineConfig;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use track_audit::AuditStore;
use track_types::{AuditAction, AuditEntry, EntityType, StageVisit};

/// Reads entity histories from the audit store and derives their stage timelines.
#[derive(Clone)]
pub struct StageTimeline {
    store: Arc<AuditStore>,
    config: TimelineConfig,
}

impl StageTimeline {
    pub fn new(store: Arc<AuditStore>, config: TimelineConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &TimelineConfig {
        &self.config
    }

    /// Visits of `entity_id` (configured entity type), oldest first.
    pub fn reconstruct(&self, entity_id: &str) -> Vec<StageVisit> {
        let entity_type = self.config.entity_type.clone();
        self.reconstruct_for(&entity_type, entity_id)
    }

    pub fn reconstruct_for(&self, entity_type: &EntityType, entity_id: &str) -> Vec<StageVisit> {
        let mut history = self.store.get_entity_history(entity_type, entity_id);
        history.reverse();
        let visits = replay(&history, &self.config);
        tracing::debug!(
            entity_type = %entity_type,
            entity_id,
            events = history.len(),
            visits = visits.len(),
            "stage timeline reconstructed"
        );
        visits
    }

    /// Stage of the open visit, if any.
    pub fn current_stage(&self, entity_id: &str) -> Option<String> {
        self.reconstruct(entity_id)
            .pop()
            .filter(StageVisit::is_open)
            .map(|v| v.stage_id)
    }

    /// Total minutes spent per stage across closed visits.
    pub fn time_in_stages(&self, entity_id: &str) -> BTreeMap<String, i64> {
        let mut totals = BTreeMap::new();
        for visit in self.reconstruct(entity_id) {
            if let Some(minutes) = visit.duration_minutes {
                *totals.entry(visit.stage_id).or_insert(0) += minutes;
            }
        }
        totals
    }
}

/// Replay `entries` (oldest first) into visits.
///
/// The first stage assignment opens the first visit; each later assignment to a different
/// stage closes the open visit at its timestamp and opens the next. Terminal events close
/// the open visit; `RESTORE` reopens the last known stage. Without any stage assignment
/// the timeline is empty.
pub fn replay(entries: &[AuditEntry], config: &TimelineConfig) -> Vec<StageVisit> {
    let mut visits: Vec<StageVisit> = Vec::new();
    let mut last_stage: Option<String> = None;
    let mut last_funnel: Option<String> = None;

    for entry in entries {
        let at = entry.timestamp;
        let funnel = scalar(entry.new_value(&config.funnel_field)).or_else(|| last_funnel.clone());

        if let Some(stage) = scalar(entry.new_value(&config.stage_field)) {
            let already_there = visits
                .last()
                .is_some_and(|v| v.is_open() && v.stage_id == stage);
            if !already_there {
                close_open(&mut visits, at);
                visits.push(StageVisit::open(stage.clone(), funnel.clone(), at));
            }
            last_stage = Some(stage);
        } else if entry.action == AuditAction::Restore && !has_open(&visits) {
            if let Some(stage) = &last_stage {
                visits.push(StageVisit::open(stage.clone(), funnel.clone(), at));
            }
        }

        if is_terminal(entry, config) {
            close_open(&mut visits, at);
        }
        last_funnel = funnel;
    }
    visits
}

fn has_open(visits: &[StageVisit]) -> bool {
    visits.last().is_some_and(StageVisit::is_open)
}

fn close_open(visits: &mut [StageVisit], at: chrono::DateTime<chrono::Utc>) {
    if let Some(open) = visits.last_mut().filter(|v| v.is_open()) {
        open.close(at);
    }
}

fn is_terminal(entry: &AuditEntry, config: &TimelineConfig) -> bool {
    if matches!(entry.action, AuditAction::Cancel | AuditAction::Delete) {
        return true;
    }
    scalar(entry.new_value(&config.status_field)).is_some_and(|status| {
        config
            .terminal_statuses
            .iter()
            .any(|t| t.eq_ignore_ascii_case(&status))
    })
}

/// Stage and funnel ids may be stored as strings or numbers.
fn scalar(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
