//! In-memory log backend.

use crate::backend::LogBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Toggles write failures on an [`InMemoryBackend`] after it has been handed
/// to a database.
#[derive(Debug, Clone, Default)]
pub struct FaultSwitch(Arc<AtomicBool>);

impl FaultSwitch {
    /// Makes every subsequent append and flush fail.
    pub fn fail_writes(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Restores normal behavior.
    pub fn heal(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    fn is_tripped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// An in-memory log.
///
/// Clones share the same bytes, so a test can drop a database and reopen a
/// new one over the clone to simulate a restart.
///
/// # Example
///
/// ```rust
/// use shoebox_storage::{LogBackend, InMemoryBackend};
///
/// let mut log = InMemoryBackend::new();
/// let reopened = log.clone();
/// log.append(b"abc").unwrap();
/// assert_eq!(reopened.size().unwrap(), 3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    data: Arc<RwLock<Vec<u8>>>,
    faults: FaultSwitch,
}

impl InMemoryBackend {
    /// Creates a new empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a log with pre-existing bytes, e.g. a torn tail.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
            faults: FaultSwitch::default(),
        }
    }

    /// Returns a copy of the log contents.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    /// Returns the switch controlling injected write faults.
    #[must_use]
    pub fn fault_switch(&self) -> FaultSwitch {
        self.faults.clone()
    }
}

impl LogBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let data = self.data.read();
        let size = data.len() as u64;
        let start = offset as usize;
        let end = start.saturating_add(len);

        if offset > size || end > data.len() {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        Ok(data[start..end].to_vec())
    }

    fn append(&mut self, bytes: &[u8]) -> StorageResult<u64> {
        if self.faults.is_tripped() {
            return Err(StorageError::InjectedFault);
        }
        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(bytes);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        if self.faults.is_tripped() {
            return Err(StorageError::InjectedFault);
        }
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.flush()
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut data = self.data.write();
        let size = data.len() as u64;
        if new_size > size {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_size,
                size,
            });
        }
        data.truncate(new_size as usize);
        Ok(())
    }
}
