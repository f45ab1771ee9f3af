//! Audit log types: AuditEntry, FieldChange, actions, entity types, filters and summaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;

/// Ordered field map used for entity snapshots (field name -> JSON value).
pub type FieldMap = serde_json::Map<String, serde_json::Value>;

/// Kind of entity an audit entry belongs to.
///
/// The well-known tags are associated constants; deployments may use any other tag.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityType(Cow<'static, str>);

impl EntityType {
    pub const SERVICE_ORDER: EntityType = EntityType(Cow::Borrowed("SERVICE_ORDER"));
    pub const SERVICE_ORDER_SERVICE: EntityType =
        EntityType(Cow::Borrowed("SERVICE_ORDER_SERVICE"));
    pub const SERVICE_ORDER_PRODUCT: EntityType =
        EntityType(Cow::Borrowed("SERVICE_ORDER_PRODUCT"));
    pub const CLIENT: EntityType = EntityType(Cow::Borrowed("CLIENT"));
    pub const PRODUCT: EntityType = EntityType(Cow::Borrowed("PRODUCT"));
    pub const SERVICE: EntityType = EntityType(Cow::Borrowed("SERVICE"));
    pub const FUNNEL: EntityType = EntityType(Cow::Borrowed("FUNNEL"));

    pub fn new(tag: impl Into<String>) -> Self {
        EntityType(Cow::Owned(tag.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for EntityType {
    fn from(s: &str) -> Self {
        EntityType::new(s)
    }
}

/// Kind of mutation recorded by an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    StatusChange,
    PriorityChange,
    AssignUser,
    UnassignUser,
    AddService,
    RemoveService,
    AddProduct,
    RemoveProduct,
    Cancel,
    Restore,
}

impl AuditAction {
    /// Every action, in declaration order.
    pub const ALL: [AuditAction; 13] = [
        AuditAction::Create,
        AuditAction::Update,
        AuditAction::Delete,
        AuditAction::StatusChange,
        AuditAction::PriorityChange,
        AuditAction::AssignUser,
        AuditAction::UnassignUser,
        AuditAction::AddService,
        AuditAction::RemoveService,
        AuditAction::AddProduct,
        AuditAction::RemoveProduct,
        AuditAction::Cancel,
        AuditAction::Restore,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
            AuditAction::StatusChange => "STATUS_CHANGE",
            AuditAction::PriorityChange => "PRIORITY_CHANGE",
            AuditAction::AssignUser => "ASSIGN_USER",
            AuditAction::UnassignUser => "UNASSIGN_USER",
            AuditAction::AddService => "ADD_SERVICE",
            AuditAction::RemoveService => "REMOVE_SERVICE",
            AuditAction::AddProduct => "ADD_PRODUCT",
            AuditAction::RemoveProduct => "REMOVE_PRODUCT",
            AuditAction::Cancel => "CANCEL",
            AuditAction::Restore => "RESTORE",
        }
    }

    /// Parse the wire tag (case-insensitive). Returns `None` for unknown tags.
    pub fn parse(tag: &str) -> Option<Self> {
        let tag = tag.trim();
        Self::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(tag))
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a single field difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Modified,
    Removed,
}

/// One field-level difference between two snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<serde_json::Value>,
    pub change_type: ChangeType,
}

/// Who performed a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub name: String,
}

impl Actor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Immutable record of one mutation to one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    /// Creation order within the store; strictly increasing.
    pub seq: u64,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub action: AuditAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_values: Option<FieldMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_values: Option<FieldMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes: Option<Vec<FieldChange>>,
    #[serde(default, skip_serializing_if = "FieldMap::is_empty")]
    pub metadata: FieldMap,
}

impl AuditEntry {
    /// True when no actor was attached (system-initiated change).
    pub fn is_system(&self) -> bool {
        self.actor_id.is_none()
    }

    /// Value of `field` in `new_values`, if recorded.
    pub fn new_value(&self, field: &str) -> Option<&serde_json::Value> {
        self.new_values.as_ref().and_then(|m| m.get(field))
    }

    /// Value of `field` in `old_values`, if recorded.
    pub fn old_value(&self, field: &str) -> Option<&serde_json::Value> {
        self.old_values.as_ref().and_then(|m| m.get(field))
    }
}

/// Entry as submitted by a caller; the store assigns id, seq, timestamp, actor and changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAuditEntry {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub action: AuditAction,
    #[serde(default)]
    pub old_values: Option<FieldMap>,
    #[serde(default)]
    pub new_values: Option<FieldMap>,
    #[serde(default)]
    pub metadata: FieldMap,
}

impl NewAuditEntry {
    pub fn new(entity_type: EntityType, entity_id: impl Into<String>, action: AuditAction) -> Self {
        Self {
            entity_type,
            entity_id: entity_id.into(),
            action,
            old_values: None,
            new_values: None,
            metadata: FieldMap::new(),
        }
    }

    /// Creation: no prior state, so every field of `values` is recorded as added.
    pub fn created(entity_type: EntityType, entity_id: impl Into<String>, values: FieldMap) -> Self {
        Self::new(entity_type, entity_id, AuditAction::Create)
            .with_old(FieldMap::new())
            .with_new(values)
    }

    pub fn updated(
        entity_type: EntityType,
        entity_id: impl Into<String>,
        old_values: FieldMap,
        new_values: FieldMap,
    ) -> Self {
        Self::new(entity_type, entity_id, AuditAction::Update)
            .with_old(old_values)
            .with_new(new_values)
    }

    /// Deletion: every field of `values` is recorded as removed.
    pub fn deleted(entity_type: EntityType, entity_id: impl Into<String>, values: FieldMap) -> Self {
        Self::new(entity_type, entity_id, AuditAction::Delete)
            .with_old(values)
            .with_new(FieldMap::new())
    }

    pub fn with_old(mut self, old_values: FieldMap) -> Self {
        self.old_values = Some(old_values);
        self
    }

    pub fn with_new(mut self, new_values: FieldMap) -> Self {
        self.new_values = Some(new_values);
        self
    }

    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}

/// Search filter over the audit log. Every field is optional; present fields are ANDed.
///
/// Values stay as caller-supplied strings so malformed input can be answered with an
/// empty result instead of an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditFilter {
    #[serde(default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub entity_id: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub actor_id: Option<String>,
    /// RFC 3339 timestamp or `YYYY-MM-DD`; inclusive.
    #[serde(default)]
    pub start_date: Option<String>,
    /// RFC 3339 timestamp or `YYYY-MM-DD` (end of that day); inclusive.
    #[serde(default)]
    pub end_date: Option<String>,
    /// Non-negative integer; anything else makes the search match nothing.
    #[serde(default)]
    pub limit: Option<String>,
    #[serde(default)]
    pub offset: Option<String>,
}

/// Aggregates over a filtered set of entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditSummary {
    pub total: usize,
    pub by_action: BTreeMap<AuditAction, usize>,
    pub by_entity_type: BTreeMap<String, usize>,
    pub by_actor: BTreeMap<String, usize>,
    pub recent: Vec<AuditEntry>,
}

/// Export encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn action_tags_round_trip_through_serde() {
        assert_eq!(
            serde_json::to_value(AuditAction::StatusChange).unwrap(),
            json!("STATUS_CHANGE")
        );
        assert_eq!(AuditAction::parse("status_change"), Some(AuditAction::StatusChange));
        assert_eq!(AuditAction::parse("TELEPORT"), None);
    }

    #[test]
    fn entity_type_accepts_deployment_tags() {
        let t: EntityType = serde_json::from_value(json!("WAREHOUSE")).unwrap();
        assert_eq!(t, EntityType::new("WAREHOUSE"));
        let so: EntityType = serde_json::from_value(json!("SERVICE_ORDER")).unwrap();
        assert_eq!(so, EntityType::SERVICE_ORDER);
    }
}
