//! JSON file storage: the whole log as one array, replaced atomically on write.

use super::{decode, encode};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use track_types::{AuditEntry, DurableIoError, DurableStorage};

pub struct JsonFileStorage {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFileStorage {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "audit-log.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl DurableStorage for JsonFileStorage {
    async fn read(&self) -> Result<Option<Vec<AuditEntry>>, DurableIoError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(DurableIoError::Io(e)),
        };
        if content.trim().is_empty() {
            return Ok(None);
        }
        decode(&content).map(Some)
    }

    async fn write(&self, entries: &[AuditEntry]) -> Result<(), DurableIoError> {
        let _guard = self.write_lock.lock().await;
        let blob = encode(entries)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, blob.as_bytes()).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AuditStore, AuditStoreConfig};
    use std::sync::Arc;
    use track_types::{AuditAction, EntityType, NewAuditEntry};

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::new(dir.path().join("audit.json"));
        assert!(storage.read().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn log_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("audit.json");
        let store = AuditStore::open(
            AuditStoreConfig::new(5),
            Arc::new(JsonFileStorage::new(&path)),
        )
        .await;
        for _ in 0..3 {
            store
                .log(
                    NewAuditEntry::new(EntityType::CLIENT, "c-1", AuditAction::Update),
                    None,
                )
                .unwrap();
        }
        store.flush().await;

        let reopened =
            AuditStore::open(AuditStoreConfig::new(5), Arc::new(JsonFileStorage::new(&path)))
                .await;
        let history = reopened.get_entity_history(&EntityType::CLIENT, "c-1");
        let seqs: Vec<u64> = history.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn garbage_file_is_reported_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.json");
        tokio::fs::write(&path, "[{\"id\":").await.unwrap();
        let storage = JsonFileStorage::new(&path);
        assert!(matches!(
            storage.read().await,
            Err(DurableIoError::Corrupt(_))
        ));
    }
}
