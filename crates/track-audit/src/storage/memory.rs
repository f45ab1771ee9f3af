//! In-process blob storage; survives store reopen but not the process.

use super::{decode, encode};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use track_types::{AuditEntry, DurableIoError, DurableStorage};

/// Keeps the serialized log as a string blob, like a browser key/value slot.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    blob: Mutex<Option<String>>,
    fail_writes: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a pre-existing blob (possibly corrupt).
    pub fn with_blob(blob: impl Into<String>) -> Self {
        Self {
            blob: Mutex::new(Some(blob.into())),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make subsequent writes fail with an I/O error.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn blob(&self) -> Option<String> {
        self.blob
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl DurableStorage for MemoryStorage {
    async fn read(&self) -> Result<Option<Vec<AuditEntry>>, DurableIoError> {
        match self.blob() {
            Some(blob) => decode(&blob).map(Some),
            None => Ok(None),
        }
    }

    async fn write(&self, entries: &[AuditEntry]) -> Result<(), DurableIoError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DurableIoError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "storage quota exceeded",
            )));
        }
        let blob = encode(entries)?;
        *self.blob.lock().unwrap_or_else(PoisonError::into_inner) = Some(blob);
        Ok(())
    }
}
