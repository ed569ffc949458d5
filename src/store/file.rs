//! JSON-file snapshot store

use std::path::{Path, PathBuf};
use tracing::debug;

use super::{Snapshot, SnapshotKey, SnapshotStore, StoreError};

/// Stores each snapshot as `<dir>/<key stem>.json`.
///
/// Writes go to a sibling temp file that is renamed into place, so a crash
/// mid-write leaves either the old snapshot or the new one.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &SnapshotKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.file_stem()))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn save(&self, key: &SnapshotKey, snapshot: &Snapshot) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| io_error(&self.dir, e))?;

        let path = self.path_for(key);
        let tmp_path = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(snapshot)?;

        std::fs::write(&tmp_path, bytes).map_err(|e| io_error(&tmp_path, e))?;
        std::fs::rename(&tmp_path, &path).map_err(|e| io_error(&path, e))?;

        debug!("Saved snapshot for {} to {:?}", key, path);
        Ok(())
    }

    fn load(&self, key: &SnapshotKey) -> Result<Option<Snapshot>, StoreError> {
        let path = self.path_for(key);
        let contents = match std::fs::read(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&path, e)),
        };

        serde_json::from_slice(&contents)
            .map(Some)
            .map_err(|source| StoreError::Corrupt { path, source })
    }

    fn delete(&self, key: &SnapshotKey) -> Result<(), StoreError> {
        let path = self.path_for(key);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!("Deleted snapshot {:?}", path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&path, e)),
        }
    }
}
