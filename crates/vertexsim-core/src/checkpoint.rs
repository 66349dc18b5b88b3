//! Checkpoint persistence.
//!
//! A checkpoint is one JSON state document, identified by its position in
//! the run. [`CheckpointStore`] is the seam the driver writes through;
//! [`DirectoryCheckpointStore`] lays checkpoints out as
//! `{prefix}{index:03}.json` files, and [`MemoryCheckpointStore`] keeps
//! them in a map.
//!
//! Directory writes go to a `.json.tmp` sibling first, are synced, and are
//! then renamed into place, so a crash never leaves a half-written file
//! under a checkpoint name.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

/// Errors raised while reading or writing checkpoints.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// A filesystem operation failed.
    #[error("checkpoint I/O on {}: {source}", .path.display())]
    Io {
        /// The file or directory involved.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A checkpoint could not be encoded.
    #[error("failed to encode checkpoint {index}: {source}")]
    Encode {
        /// The checkpoint index.
        index: u64,
        /// The encode error.
        source: serde_json::Error,
    },

    /// A checkpoint file is not valid JSON.
    #[error("failed to decode checkpoint {}: {source}", .path.display())]
    Decode {
        /// The file involved.
        path: PathBuf,
        /// The decode error.
        source: serde_json::Error,
    },

    /// No checkpoint exists at the requested index.
    #[error("no checkpoint with index {index}")]
    Missing {
        /// The requested index.
        index: u64,
    },
}

/// Somewhere to put checkpoints.
pub trait CheckpointStore {
    /// Persist `checkpoint` under `index`, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError`] if the checkpoint cannot be written.
    fn write(&mut self, index: u64, checkpoint: &Value) -> Result<(), CheckpointError>;

    /// Indices of all stored checkpoints, ascending.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError`] if the store cannot be listed.
    fn list_existing(&self) -> Result<Vec<u64>, CheckpointError>;

    /// Remove every stored checkpoint.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError`] if a checkpoint cannot be removed.
    fn clear(&mut self) -> Result<(), CheckpointError>;
}

// ---------------------------------------------------------------------------
// Directory store
// ---------------------------------------------------------------------------

/// Checkpoints as pretty-printed JSON files in one directory.
#[derive(Debug, Clone)]
pub struct DirectoryCheckpointStore {
    dir: PathBuf,
    prefix: String,
}

impl DirectoryCheckpointStore {
    /// Open a store in `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::Io`] if the directory cannot be created.
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Result<Self, CheckpointError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| CheckpointError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self {
            dir,
            prefix: prefix.into(),
        })
    }

    /// The directory checkpoints are written to.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name for checkpoint `index`: the prefix, then the index
    /// zero-padded to three digits (wider indices are not truncated).
    pub fn file_name(&self, index: u64) -> String {
        format!("{}{index:03}.json", self.prefix)
    }

    /// Full path for checkpoint `index`.
    pub fn path_for(&self, index: u64) -> PathBuf {
        self.dir.join(self.file_name(index))
    }

    /// Read checkpoint `index` back.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::Missing`] if there is no such file,
    /// [`CheckpointError::Io`] if it cannot be read, or
    /// [`CheckpointError::Decode`] if it is not JSON.
    pub fn read(&self, index: u64) -> Result<Value, CheckpointError> {
        let path = self.path_for(index);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CheckpointError::Missing { index });
            }
            Err(source) => return Err(CheckpointError::Io { path, source }),
        };
        serde_json::from_str(&text).map_err(|source| CheckpointError::Decode { path, source })
    }

    /// Parse a file name produced by [`file_name`](Self::file_name).
    fn parse_index(&self, name: &str) -> Option<u64> {
        let digits = name.strip_prefix(&self.prefix)?.strip_suffix(".json")?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    fn is_stale_temp(&self, name: &str) -> bool {
        name.strip_suffix(".tmp")
            .is_some_and(|stem| self.parse_index(stem).is_some())
    }

    fn entries(&self) -> Result<Vec<String>, CheckpointError> {
        let io_err = |source| CheckpointError::Io {
            path: self.dir.clone(),
            source,
        };
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            if !entry.file_type().map_err(io_err)?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_owned());
            }
        }
        Ok(names)
    }
}

/// Write `bytes` to `temp`, sync, and rename onto `target`.
fn write_then_rename(bytes: &[u8], temp: &Path, target: &Path) -> Result<(), CheckpointError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| CheckpointError::Io { path, source }
    };
    let mut file = fs::File::create(temp).map_err(io_err(temp))?;
    file.write_all(bytes).map_err(io_err(temp))?;
    file.sync_all().map_err(io_err(temp))?;
    drop(file);
    fs::rename(temp, target).map_err(io_err(target))
}

impl CheckpointStore for DirectoryCheckpointStore {
    fn write(&mut self, index: u64, checkpoint: &Value) -> Result<(), CheckpointError> {
        let bytes = serde_json::to_vec_pretty(checkpoint)
            .map_err(|source| CheckpointError::Encode { index, source })?;

        let final_path = self.path_for(index);
        let temp_path = self.dir.join(format!("{}.tmp", self.file_name(index)));

        if let Err(err) = write_then_rename(&bytes, &temp_path, &final_path) {
            // Nothing half-written may stay behind.
            match fs::remove_file(&temp_path) {
                Err(cleanup) if cleanup.kind() != std::io::ErrorKind::NotFound => {
                    warn!(
                        path = %temp_path.display(),
                        error = %cleanup,
                        "Failed to remove temp checkpoint"
                    );
                }
                _ => {}
            }
            return Err(err);
        }

        debug!(index, path = %final_path.display(), bytes = bytes.len(), "Checkpoint written");
        Ok(())
    }

    fn list_existing(&self) -> Result<Vec<u64>, CheckpointError> {
        let mut indices: Vec<u64> = self
            .entries()?
            .iter()
            .filter_map(|name| self.parse_index(name))
            .collect();
        indices.sort_unstable();
        Ok(indices)
    }

    fn clear(&mut self) -> Result<(), CheckpointError> {
        let mut removed = 0_usize;
        for name in self.entries()? {
            if self.parse_index(&name).is_some() || self.is_stale_temp(&name) {
                let path = self.dir.join(&name);
                fs::remove_file(&path).map_err(|source| CheckpointError::Io { path, source })?;
                removed = removed.saturating_add(1);
            }
        }
        debug!(dir = %self.dir.display(), removed, "Checkpoints cleared");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Memory store
// ---------------------------------------------------------------------------

/// Checkpoints held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryCheckpointStore {
    checkpoints: BTreeMap<u64, Value>,
}

impl MemoryCheckpointStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Checkpoint `index`, if stored.
    pub fn get(&self, index: u64) -> Option<&Value> {
        self.checkpoints.get(&index)
    }

    /// All checkpoints in index order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &Value)> {
        self.checkpoints.iter().map(|(&i, v)| (i, v))
    }

    /// Number of stored checkpoints.
    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn write(&mut self, index: u64, checkpoint: &Value) -> Result<(), CheckpointError> {
        self.checkpoints.insert(index, checkpoint.clone());
        Ok(())
    }

    fn list_existing(&self) -> Result<Vec<u64>, CheckpointError> {
        Ok(self.checkpoints.keys().copied().collect())
    }

    fn clear(&mut self) -> Result<(), CheckpointError> {
        self.checkpoints.clear();
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "vertexsim-checkpoint-{name}-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn file_names_are_zero_padded() {
        let store = DirectoryCheckpointStore::new(scratch_dir("names"), "vmst_").unwrap();
        assert_eq!(store.file_name(0), "vmst_000.json");
        assert_eq!(store.file_name(49), "vmst_049.json");
        assert_eq!(store.file_name(1234), "vmst_1234.json");
        fs::remove_dir_all(store.dir()).unwrap();
    }

    #[test]
    fn write_read_list_clear() {
        let dir = scratch_dir("cycle");
        let mut store = DirectoryCheckpointStore::new(&dir, "vmst_").unwrap();
        for index in [2, 0, 1] {
            store.write(index, &json!({"step": index * 40})).unwrap();
        }
        fs::write(dir.join("notes.txt"), "keep me").unwrap();
        fs::write(dir.join("other_000.json"), "{}").unwrap();
        fs::write(dir.join("vmst_007.json.tmp"), "partial").unwrap();

        assert_eq!(store.list_existing().unwrap(), vec![0, 1, 2]);
        assert_eq!(store.read(1).unwrap(), json!({"step": 40}));
        assert!(!dir.join("vmst_001.json.tmp").exists());

        store.clear().unwrap();
        assert!(store.list_existing().unwrap().is_empty());
        assert!(!dir.join("vmst_007.json.tmp").exists());
        assert!(dir.join("notes.txt").exists());
        assert!(dir.join("other_000.json").exists());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn failed_write_leaves_nothing_behind() {
        let dir = scratch_dir("failed-write");
        let mut store = DirectoryCheckpointStore::new(&dir, "vmst_").unwrap();
        store.write(0, &json!({"step": 0})).unwrap();
        // A directory squatting on the target name makes the rename fail.
        fs::create_dir(store.path_for(1)).unwrap();

        let err = store.write(1, &json!({"step": 40})).unwrap_err();
        assert!(matches!(err, CheckpointError::Io { .. }));
        assert!(store.path_for(1).is_dir());
        assert!(!dir.join("vmst_001.json.tmp").exists());
        assert_eq!(store.list_existing().unwrap(), vec![0]);
        assert_eq!(store.read(0).unwrap(), json!({"step": 0}));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn rewrite_replaces_previous_checkpoint() {
        let dir = scratch_dir("rewrite");
        let mut store = DirectoryCheckpointStore::new(&dir, "run_").unwrap();
        store.write(0, &json!({"v": 1})).unwrap();
        store.write(0, &json!({"v": 2})).unwrap();
        assert_eq!(store.read(0).unwrap(), json!({"v": 2}));
        assert_eq!(store.list_existing().unwrap(), vec![0]);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_and_corrupt_checkpoints() {
        let dir = scratch_dir("corrupt");
        let store = DirectoryCheckpointStore::new(&dir, "vmst_").unwrap();
        assert!(matches!(store.read(3).unwrap_err(), CheckpointError::Missing { index: 3 }));
        fs::write(store.path_for(3), "{not json").unwrap();
        assert!(matches!(store.read(3).unwrap_err(), CheckpointError::Decode { .. }));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn memory_store_orders_by_index() {
        let mut store = MemoryCheckpointStore::new();
        store.write(5, &json!(5)).unwrap();
        store.write(1, &json!(1)).unwrap();
        assert_eq!(store.list_existing().unwrap(), vec![1, 5]);
        assert_eq!(store.get(5), Some(&json!(5)));
        store.clear().unwrap();
        assert!(store.is_empty());
    }
}
