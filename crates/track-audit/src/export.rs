//! JSON and CSV export of filtered audit entries.

use crate::{AuditError, AuditStore};
use serde_json::Value;
use track_types::{AuditEntry, AuditFilter, ExportFormat, FieldChange};

const CSV_HEADER: [&str; 7] = [
    "ID",
    "EntityType",
    "EntityId",
    "Action",
    "Actor",
    "Timestamp",
    "Changes",
];

impl AuditStore {
    /// Export the entries `search(filter)` would return.
    pub fn export(&self, filter: &AuditFilter, format: ExportFormat) -> Result<String, AuditError> {
        let entries = self.search(filter);
        match format {
            ExportFormat::Json => {
                serde_json::to_string_pretty(&entries).map_err(|e| AuditError::Export(e.to_string()))
            }
            ExportFormat::Csv => Ok(to_csv(&entries)),
        }
    }
}

fn to_csv(entries: &[AuditEntry]) -> String {
    let mut out = csv_row(CSV_HEADER.iter().map(|h| h.to_string()));
    for entry in entries {
        let actor = entry
            .actor_name
            .clone()
            .or_else(|| entry.actor_id.clone())
            .unwrap_or_else(|| "System".to_string());
        let changes = entry
            .changes
            .as_deref()
            .map(render_changes)
            .unwrap_or_default();
        out.push_str(&csv_row(
            [
                entry.id.clone(),
                entry.entity_type.to_string(),
                entry.entity_id.clone(),
                entry.action.to_string(),
                actor,
                entry.timestamp.to_rfc3339(),
                changes,
            ]
            .into_iter(),
        ));
    }
    out
}

fn csv_row(fields: impl Iterator<Item = String>) -> String {
    let mut row = fields
        .map(|f| format!("\"{}\"", f.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(",");
    row.push('\n');
    row
}

/// `field: old → new` segments joined by `; `.
fn render_changes(changes: &[FieldChange]) -> String {
    changes
        .iter()
        .map(|c| {
            format!(
                "{}: {} → {}",
                c.field,
                render_value(c.old_value.as_ref()),
                render_value(c.new_value.as_ref())
            )
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn render_value(value: Option<&Value>) -> String {
    match value {
        None => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AuditStoreConfig;
    use serde_json::json;
    use track_types::{Actor, AuditAction, EntityType, NewAuditEntry};

    fn store_with_update() -> AuditStore {
        let store = AuditStore::in_memory(AuditStoreConfig::default());
        store
            .log(
                NewAuditEntry::updated(
                    EntityType::SERVICE_ORDER,
                    "so-1",
                    json!({ "title": "Inspection \"A\"", "total": 10 })
                        .as_object()
                        .cloned()
                        .unwrap(),
                    json!({ "title": "Inspection B", "total": 12, "notes": "x" })
                        .as_object()
                        .cloned()
                        .unwrap(),
                ),
                Some(&Actor::new("u-1", "Ana")),
            )
            .unwrap();
        store
            .log(
                NewAuditEntry::new(EntityType::CLIENT, "c-1", AuditAction::Delete),
                None,
            )
            .unwrap();
        store
    }

    #[test]
    fn csv_quotes_every_field_and_renders_changes() {
        let store = store_with_update();
        let csv = store
            .export(
                &AuditFilter {
                    entity_id: Some("so-1".into()),
                    ..AuditFilter::default()
                },
                ExportFormat::Csv,
            )
            .unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines[0],
            "\"ID\",\"EntityType\",\"EntityId\",\"Action\",\"Actor\",\"Timestamp\",\"Changes\""
        );
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("\"SERVICE_ORDER\",\"so-1\",\"UPDATE\",\"Ana\""));
        assert!(lines[1].ends_with(
            "\"title: Inspection \"\"A\"\" → Inspection B; total: 10 → 12; notes:  → x\""
        ));
    }

    #[test]
    fn csv_marks_system_actor() {
        let store = store_with_update();
        let csv = store
            .export(
                &AuditFilter {
                    entity_type: Some("CLIENT".into()),
                    ..AuditFilter::default()
                },
                ExportFormat::Csv,
            )
            .unwrap();
        let row = csv.lines().nth(1).unwrap();
        assert!(row.contains("\"DELETE\",\"System\""));
        assert!(row.ends_with(",\"\""));
    }

    #[test]
    fn json_export_is_an_entry_array() {
        let store = store_with_update();
        let json = store
            .export(&AuditFilter::default(), ExportFormat::Json)
            .unwrap();
        let parsed: Vec<AuditEntry> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, store.search(&AuditFilter::default()));
    }
}
