//! In-memory snapshot store for engine tests

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::{Snapshot, SnapshotKey, SnapshotStore, StoreError};

#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: Mutex<HashMap<SnapshotKey, Snapshot>>,
    fail_saves: AtomicBool,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `save` fail with an I/O error
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn get(&self, key: &SnapshotKey) -> Option<Snapshot> {
        self.snapshots.lock().unwrap().get(key).cloned()
    }

    pub fn insert(&self, key: SnapshotKey, snapshot: Snapshot) {
        self.snapshots.lock().unwrap().insert(key, snapshot);
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn save(&self, key: &SnapshotKey, snapshot: &Snapshot) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Io {
                path: PathBuf::from("memory"),
                source: std::io::Error::new(std::io::ErrorKind::Other, "storage quota exceeded"),
            });
        }
        self.snapshots
            .lock()
            .unwrap()
            .insert(key.clone(), snapshot.clone());
        Ok(())
    }

    fn load(&self, key: &SnapshotKey) -> Result<Option<Snapshot>, StoreError> {
        Ok(self.snapshots.lock().unwrap().get(key).cloned())
    }

    fn delete(&self, key: &SnapshotKey) -> Result<(), StoreError> {
        self.snapshots.lock().unwrap().remove(key);
        Ok(())
    }
}
