//! AuditStore configuration.

use std::path::PathBuf;

/// Default capacity of the audit log.
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

#[derive(Debug, Clone)]
pub struct AuditStoreConfig {
    /// Entries kept before the oldest are evicted. Never below 1; set through `new`.
    max_entries: usize,
    /// JSON file holding the persisted log; `None` keeps the log in memory only.
    pub path: Option<PathBuf>,
}

impl AuditStoreConfig {
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries: max_entries.max(1),
            path: None,
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Read `TRACK_AUDIT_MAX_ENTRIES` and `TRACK_AUDIT_PATH`.
    pub fn from_env() -> Self {
        let max_entries = std::env::var("TRACK_AUDIT_MAX_ENTRIES")
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(DEFAULT_MAX_ENTRIES);
        let path = std::env::var("TRACK_AUDIT_PATH")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);
        Self {
            max_entries: max_entries.max(1),
            path,
        }
    }
}

impl Default for AuditStoreConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_is_at_least_one() {
        assert_eq!(AuditStoreConfig::new(0).max_entries(), 1);
        assert_eq!(
            AuditStoreConfig::new(0).with_path("audit.json").max_entries(),
            1
        );
        assert_eq!(AuditStoreConfig::default().max_entries(), DEFAULT_MAX_ENTRIES);
    }
}
