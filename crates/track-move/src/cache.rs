//! Local cache of entity views (list rows and detail records).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// One cached list query (e.g. a pipeline column or a table page).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedList {
    pub rows: Vec<Value>,
    /// Set after a committed change; the next reader should refetch.
    pub needs_refresh: bool,
}

/// One cached detail record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedRecord {
    pub record: Value,
    pub needs_refresh: bool,
}

/// Full cache contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheContents {
    pub lists: BTreeMap<String, CachedList>,
    pub details: BTreeMap<String, CachedRecord>,
}

#[derive(Debug, Clone)]
struct RowSnapshot {
    list_key: String,
    index: usize,
    row: Value,
}

/// Copies of every cached view of one entity, taken just before an optimistic write.
#[derive(Debug, Clone)]
pub struct CacheSnapshot {
    entity_id: String,
    from_stage: Option<String>,
    rows: Vec<RowSnapshot>,
    detail: Option<CachedRecord>,
}

impl CacheSnapshot {
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// Stage the entity had before the write, if any cached view knew it.
    pub fn from_stage(&self) -> Option<&str> {
        self.from_stage.as_deref()
    }

    /// Number of cached views captured.
    pub fn views(&self) -> usize {
        self.rows.len() + usize::from(self.detail.is_some())
    }
}

/// Entity cache shared by the UI readers and the stage-move coordinator.
///
/// Rows and records are JSON objects identified by `id_field`. All operations are
/// synchronous; readers never observe a half-applied move.
pub struct EntityCache {
    id_field: String,
    stage_field: String,
    state: RwLock<CacheContents>,
}

impl EntityCache {
    pub fn new(id_field: impl Into<String>, stage_field: impl Into<String>) -> Self {
        Self {
            id_field: id_field.into(),
            stage_field: stage_field.into(),
            state: RwLock::new(CacheContents::default()),
        }
    }

    pub fn stage_field(&self) -> &str {
        &self.stage_field
    }

    fn read(&self) -> RwLockReadGuard<'_, CacheContents> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CacheContents> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a freshly fetched list; clears its refresh flag.
    pub fn put_list(&self, key: impl Into<String>, rows: Vec<Value>) {
        self.write().lists.insert(
            key.into(),
            CachedList {
                rows,
                needs_refresh: false,
            },
        );
    }

    /// Store a freshly fetched detail record; clears its refresh flag.
    pub fn put_detail(&self, entity_id: impl Into<String>, record: Value) {
        self.write().details.insert(
            entity_id.into(),
            CachedRecord {
                record,
                needs_refresh: false,
            },
        );
    }

    pub fn list(&self, key: &str) -> Option<CachedList> {
        self.read().lists.get(key).cloned()
    }

    pub fn detail(&self, entity_id: &str) -> Option<CachedRecord> {
        self.read().details.get(entity_id).cloned()
    }

    pub fn remove_list(&self, key: &str) -> Option<CachedList> {
        self.write().lists.remove(key)
    }

    pub fn remove_detail(&self, entity_id: &str) -> Option<CachedRecord> {
        self.write().details.remove(entity_id)
    }

    pub fn contents(&self) -> CacheContents {
        self.read().clone()
    }

    /// Current stage of the entity: detail record first, then the first list row.
    pub fn stage_of(&self, entity_id: &str) -> Option<String> {
        let state = self.read();
        self.stage_in(&state, entity_id)
    }

    fn stage_in(&self, state: &CacheContents, entity_id: &str) -> Option<String> {
        if let Some(detail) = state.details.get(entity_id) {
            if let Some(stage) = field_string(&detail.record, &self.stage_field) {
                return Some(stage);
            }
        }
        state
            .lists
            .values()
            .flat_map(|l| l.rows.iter())
            .filter(|row| self.is_entity(row, entity_id))
            .find_map(|row| field_string(row, &self.stage_field))
    }

    fn is_entity(&self, row: &Value, entity_id: &str) -> bool {
        field_string(row, &self.id_field).is_some_and(|id| id == entity_id)
    }

    /// Snapshot every view of `entity_id`, then rewrite its stage to `target` everywhere,
    /// under one write lock. Returns `None` (and changes nothing) when every cached view
    /// already shows the entity in `target`.
    pub fn begin_move(&self, entity_id: &str, target: &str) -> Option<CacheSnapshot> {
        let mut state = self.write();
        let detail_stage = state
            .details
            .get(entity_id)
            .map(|d| field_string(&d.record, &self.stage_field));
        let row_stages: Vec<Option<String>> = state
            .lists
            .values()
            .flat_map(|l| l.rows.iter())
            .filter(|row| self.is_entity(row, entity_id))
            .map(|row| field_string(row, &self.stage_field))
            .collect();
        let mut views = detail_stage.iter().chain(row_stages.iter()).peekable();
        if views.peek().is_some() && views.all(|s| s.as_deref() == Some(target)) {
            return None;
        }
        // Prefer a view that still shows the old stage; the detail may already be ahead.
        let from_stage = detail_stage
            .iter()
            .chain(row_stages.iter())
            .flatten()
            .find(|s| s.as_str() != target)
            .cloned()
            .or_else(|| self.stage_in(&state, entity_id));

        let mut snapshot = CacheSnapshot {
            entity_id: entity_id.to_string(),
            from_stage,
            rows: Vec::new(),
            detail: state.details.get(entity_id).cloned(),
        };
        for (key, list) in &state.lists {
            for (index, row) in list.rows.iter().enumerate() {
                if self.is_entity(row, entity_id) {
                    snapshot.rows.push(RowSnapshot {
                        list_key: key.clone(),
                        index,
                        row: row.clone(),
                    });
                }
            }
        }

        let stage = Value::String(target.to_string());
        for list in state.lists.values_mut() {
            for row in list.rows.iter_mut() {
                if self.is_entity(row, entity_id) {
                    set_field(row, &self.stage_field, stage.clone());
                }
            }
        }
        if let Some(detail) = state.details.get_mut(entity_id) {
            set_field(&mut detail.record, &self.stage_field, stage);
        }
        Some(snapshot)
    }

    /// Put every captured row and the detail record back as they were.
    ///
    /// Rows of other entities are left alone, and so are list refresh flags: `begin_move`
    /// never sets them, so any flag raised since was raised by another entity's commit.
    pub fn restore(&self, snapshot: CacheSnapshot) {
        let mut state = self.write();
        for saved in snapshot.rows {
            let Some(list) = state.lists.get_mut(&saved.list_key) else {
                continue;
            };
            let position = if list
                .rows
                .get(saved.index)
                .is_some_and(|row| self.is_entity(row, &snapshot.entity_id))
            {
                Some(saved.index)
            } else {
                list.rows
                    .iter()
                    .position(|row| self.is_entity(row, &snapshot.entity_id))
            };
            if let Some(i) = position {
                list.rows[i] = saved.row;
            }
        }
        if let Some(detail) = snapshot.detail {
            state.details.insert(snapshot.entity_id, detail);
        }
    }

    /// Flag every view captured in `snapshot` for refetch on next access.
    pub fn mark_needs_refresh(&self, snapshot: &CacheSnapshot) {
        let mut state = self.write();
        for saved in &snapshot.rows {
            if let Some(list) = state.lists.get_mut(&saved.list_key) {
                list.needs_refresh = true;
            }
        }
        if let Some(detail) = state.details.get_mut(&snapshot.entity_id) {
            detail.needs_refresh = true;
        }
    }
}

fn field_string(value: &Value, field: &str) -> Option<String> {
    match value.get(field)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn set_field(value: &mut Value, field: &str, new: Value) {
    if let Value::Object(map) = value {
        map.insert(field.to_string(), new);
    }
}
