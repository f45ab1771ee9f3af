//! Request and response DTOs for the HTTP host.

use crate::{Actor, AuditEntry, AuditSummary, NewAuditEntry, StageVisit};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Base response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseResponse<T> {
    #[serde(default = "default_code")]
    pub code: i32,
    pub message: String,
    #[serde(default)]
    pub data: Option<T>,
}

fn default_code() -> i32 {
    200
}

impl<T> BaseResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            code: 200,
            message: "Success".to_string(),
            data: Some(data),
        }
    }

    pub fn error(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

/// Record-a-change request. `actor` overrides the session actor when present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRequest {
    #[serde(flatten)]
    pub entry: NewAuditEntry,
    #[serde(default)]
    pub actor: Option<Actor>,
}

/// Drag an entity to another pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveRequest {
    pub entity_id: String,
    pub target_stage_id: String,
}

/// Result of a stage move as returned to the UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveResult {
    pub entity_id: String,
    #[serde(default)]
    pub from_stage_id: Option<String>,
    pub to_stage_id: String,
    pub phase: String,
    #[serde(default)]
    pub audit_entry_id: Option<String>,
}

/// Drop entries strictly older than `older_than`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupRequest {
    pub older_than: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupResult {
    pub removed: usize,
}

pub type LogResponse = BaseResponse<AuditEntry>;
pub type HistoryResponse = BaseResponse<Vec<AuditEntry>>;
pub type SummaryResponse = BaseResponse<AuditSummary>;
pub type TimelineResponse = BaseResponse<Vec<StageVisit>>;
pub type MoveResponse = BaseResponse<MoveResult>;
pub type CleanupResponse = BaseResponse<CleanupResult>;
