//! Search and aggregation over the audit log.

use crate::AuditStore;
use chrono::{DateTime, NaiveDate, Utc};
use track_types::{AuditAction, AuditEntry, AuditFilter, AuditSummary};

/// Entries listed in a summary's `recent` section.
pub const SUMMARY_RECENT: usize = 10;

/// Actor key used in summaries for system-initiated entries.
pub const SYSTEM_ACTOR: &str = "system";

/// Filter with every caller-supplied string parsed.
#[derive(Debug, Default)]
struct Criteria<'a> {
    entity_type: Option<&'a str>,
    entity_id: Option<&'a str>,
    action: Option<AuditAction>,
    actor_id: Option<&'a str>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
}

impl<'a> Criteria<'a> {
    /// `None` when any supplied value is malformed; such a filter matches nothing.
    fn parse(filter: &'a AuditFilter) -> Option<Self> {
        let action = match filter.action.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(tag) => Some(AuditAction::parse(tag)?),
        };
        let start = match non_empty(filter.start_date.as_deref()) {
            None => None,
            Some(s) => Some(parse_bound(s, Bound::Start)?),
        };
        let end = match non_empty(filter.end_date.as_deref()) {
            None => None,
            Some(s) => Some(parse_bound(s, Bound::End)?),
        };
        Some(Self {
            entity_type: non_empty(filter.entity_type.as_deref()),
            entity_id: non_empty(filter.entity_id.as_deref()),
            action,
            actor_id: non_empty(filter.actor_id.as_deref()),
            start,
            end,
        })
    }

    fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(t) = self.entity_type {
            if entry.entity_type.as_str() != t {
                return false;
            }
        }
        if let Some(id) = self.entity_id {
            if entry.entity_id != id {
                return false;
            }
        }
        if let Some(action) = self.action {
            if entry.action != action {
                return false;
            }
        }
        if let Some(actor) = self.actor_id {
            if entry.actor_id.as_deref() != Some(actor) {
                return false;
            }
        }
        if let Some(start) = self.start {
            if entry.timestamp < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if entry.timestamp > end {
                return false;
            }
        }
        true
    }
}

#[derive(Clone, Copy)]
enum Bound {
    Start,
    End,
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// RFC 3339 timestamp, or a plain date widened to the start/end of that day (UTC).
fn parse_bound(s: &str, bound: Bound) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
    let time = match bound {
        Bound::Start => date.and_hms_opt(0, 0, 0)?,
        Bound::End => date.and_hms_nano_opt(23, 59, 59, 999_999_999)?,
    };
    Some(time.and_utc())
}

/// Absent or blank means `default`; anything but a non-negative integer is `None`.
fn parse_count(s: Option<&str>, default: usize) -> Option<usize> {
    match non_empty(s) {
        None => Some(default),
        Some(s) => s.parse().ok(),
    }
}

impl AuditStore {
    fn matching(&self, filter: &AuditFilter) -> Vec<AuditEntry> {
        let Some(criteria) = Criteria::parse(filter) else {
            tracing::debug!(?filter, "malformed audit filter, empty result");
            return Vec::new();
        };
        self.read_state()
            .entries
            .iter()
            .filter(|e| criteria.matches(e))
            .cloned()
            .collect()
    }

    /// Entries matching every present filter field, most recent first.
    /// `offset` then `limit` are applied after filtering.
    pub fn search(&self, filter: &AuditFilter) -> Vec<AuditEntry> {
        let (Some(offset), Some(limit)) = (
            parse_count(filter.offset.as_deref(), 0),
            parse_count(filter.limit.as_deref(), usize::MAX),
        ) else {
            tracing::debug!(?filter, "malformed audit pagination, empty result");
            return Vec::new();
        };
        self.matching(filter)
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect()
    }

    /// Aggregates over the filtered set; pagination fields are ignored.
    pub fn get_summary(&self, filter: &AuditFilter) -> AuditSummary {
        let entries = self.matching(filter);
        let mut summary = AuditSummary {
            total: entries.len(),
            by_action: AuditAction::ALL.iter().map(|a| (*a, 0)).collect(),
            ..AuditSummary::default()
        };
        for entry in &entries {
            *summary.by_action.entry(entry.action).or_default() += 1;
            *summary
                .by_entity_type
                .entry(entry.entity_type.to_string())
                .or_default() += 1;
            let actor = entry.actor_id.as_deref().unwrap_or(SYSTEM_ACTOR);
            *summary.by_actor.entry(actor.to_string()).or_default() += 1;
        }
        summary.recent = entries.into_iter().take(SUMMARY_RECENT).collect();
        summary
    }
}
