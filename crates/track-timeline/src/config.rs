//! Which fields and actions drive the timeline.

use track_types::EntityType;

#[derive(Debug, Clone)]
pub struct TimelineConfig {
    /// Entity type used by `StageTimeline::reconstruct`.
    pub entity_type: EntityType,
    pub stage_field: String,
    pub funnel_field: String,
    pub status_field: String,
    /// Status values (case-insensitive) that close the open visit.
    pub terminal_statuses: Vec<String>,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            entity_type: EntityType::SERVICE_ORDER,
            stage_field: "stage_id".to_string(),
            funnel_field: "funnel_id".to_string(),
            status_field: "status".to_string(),
            terminal_statuses: vec![
                "CANCELLED".to_string(),
                "CLOSED".to_string(),
                "COMPLETED".to_string(),
            ],
        }
    }
}

impl TimelineConfig {
    /// Read `TRACK_ENTITY_TYPE`, `TRACK_STAGE_FIELD`, `TRACK_FUNNEL_FIELD`,
    /// `TRACK_STATUS_FIELD` and `TRACK_TERMINAL_STATUSES` (comma separated).
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
        if let Ok(v) = std::env::var("TRACK_FUNNEL_FIELD") {
            if !v.trim().is_empty() {
                cfg.funnel_field = v.trim().to_string();
            }
        }
        if let Ok(v) = std::env::var("TRACK_STATUS_FIELD") {
            if !v.trim().is_empty() {
                cfg.status_field = v.trim().to_string();
            }
        }
        if let Ok(v) = std::env::var("TRACK_TERMINAL_STATUSES") {
            let statuses: Vec<String> = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !statuses.is_empty() {
                cfg.terminal_statuses = statuses;
            }
        }
        cfg
    }
}
