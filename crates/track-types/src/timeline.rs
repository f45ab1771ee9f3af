//! Derived stage timeline types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Interval during which an entity occupied one pipeline stage. Derived, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageVisit {
    pub stage_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funnel_id: Option<String>,
    pub entered_at: DateTime<Utc>,
    pub exited_at: Option<DateTime<Utc>>,
    /// Whole minutes spent in the stage (floored); set only when `exited_at` is.
    pub duration_minutes: Option<i64>,
}

impl StageVisit {
    pub fn open(stage_id: String, funnel_id: Option<String>, entered_at: DateTime<Utc>) -> Self {
        Self {
            stage_id,
            funnel_id,
            entered_at,
            exited_at: None,
            duration_minutes: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.exited_at.is_none()
    }

    /// Close the visit at `at`. Durations never go negative.
    pub fn close(&mut self, at: DateTime<Utc>) {
        let minutes = (at - self.entered_at).num_minutes().max(0);
        self.exited_at = Some(at);
        self.duration_minutes = Some(minutes);
    }
}
