//! On-Disk Snapshot Store
//!
//! The whole table is written as one JSON object at shutdown and read back
//! at startup:
//!
//! ```text
//! {
//!   "foo": { "value": "bar", "expires_at": { "secs_since_epoch": ..., "nanos_since_epoch": ... } },
//!   ...
//! }
//! ```
//!
//! Writes truncate and overwrite the file in place. A crash in the middle
//! of a write can leave a corrupt snapshot behind, which the next startup
//! reports as a decode failure.

use crate::storage::{Snapshot, StorageEngine};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};

/// Name of the snapshot file inside the data directory.
pub const SNAPSHOT_FILE_NAME: &str = "dump.json";

/// Errors raised while saving or loading a snapshot.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to create data directory {}: {source}", .path.display())]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("failed to read snapshot {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to write snapshot {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to encode snapshot: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode snapshot {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("snapshot operation timed out after {0:?}")]
    Timeout(Duration),
}

/// Saves and loads storage snapshots in a data directory.
///
/// The store never touches the table directly: it reads through
/// [`StorageEngine::dump`] and writes through [`StorageEngine::restore`].
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    /// Opens a store in `data_dir`, creating the directory if needed.
    ///
    /// An existing snapshot file is left untouched.
    pub async fn open(data_dir: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let data_dir = data_dir.as_ref();

        fs::create_dir_all(data_dir)
            .await
            .map_err(|source| PersistenceError::CreateDir {
                path: data_dir.to_path_buf(),
                source,
            })?;

        Ok(Self {
            path: data_dir.join(SNAPSHOT_FILE_NAME),
        })
    }

    /// Path of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the snapshot file and merges it into `engine`.
    ///
    /// A missing or empty file means there is no prior data.
    ///
    /// # Returns
    ///
    /// Returns the number of entries inserted into the engine.
    pub async fn restore(&self, engine: &StorageEngine) -> Result<usize, PersistenceError> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No snapshot file, nothing to restore");
                return Ok(0);
            }
            Err(source) => {
                return Err(PersistenceError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            debug!(path = %self.path.display(), "Snapshot file is empty, nothing to restore");
            return Ok(0);
        }

        let snapshot: Snapshot =
            serde_json::from_slice(&bytes).map_err(|source| PersistenceError::Decode {
                path: self.path.clone(),
                source,
            })?;

        let total = snapshot.len();
        let restored = engine.restore(snapshot);
        info!(
            path = %self.path.display(),
            restored,
            skipped = total - restored,
            "Snapshot restored"
        );

        Ok(restored)
    }

    /// Writes a full dump of `engine` to the snapshot file.
    ///
    /// # Returns
    ///
    /// Returns the number of entries written.
    pub async fn persist(&self, engine: &StorageEngine) -> Result<usize, PersistenceError> {
        let snapshot = engine.dump();
        let bytes = serde_json::to_vec(&snapshot).map_err(PersistenceError::Encode)?;

        fs::write(&self.path, bytes)
            .await
            .map_err(|source| PersistenceError::Write {
                path: self.path.clone(),
                source,
            })?;

        info!(path = %self.path.display(), keys = snapshot.len(), "Snapshot written");

        Ok(snapshot.len())
    }

    /// [`persist`](Self::persist) bounded by `timeout`.
    pub async fn persist_within(
        &self,
        engine: &StorageEngine,
        timeout: Duration,
    ) -> Result<usize, PersistenceError> {
        tokio::time::timeout(timeout, self.persist(engine))
            .await
            .map_err(|_| PersistenceError::Timeout(timeout))?
    }

    /// [`restore`](Self::restore) bounded by `timeout`.
    pub async fn restore_within(
        &self,
        engine: &StorageEngine,
        timeout: Duration,
    ) -> Result<usize, PersistenceError> {
        tokio::time::timeout(timeout, self.restore(engine))
            .await
            .map_err(|_| PersistenceError::Timeout(timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_open_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("nested").join("cacher");

        let store = assert_ok!(SnapshotStore::open(&data_dir).await);

        assert!(data_dir.is_dir());
        assert_eq!(store.path(), data_dir.join(SNAPSHOT_FILE_NAME));
    }

    #[tokio::test]
    async fn test_restore_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).await.unwrap();
        let engine = StorageEngine::new();

        assert_eq!(assert_ok!(store.restore(&engine).await), 0);
        assert!(engine.is_empty());
    }

    #[tokio::test]
    async fn test_restore_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).await.unwrap();
        std::fs::write(store.path(), b"").unwrap();

        let engine = StorageEngine::new();
        assert_eq!(assert_ok!(store.restore(&engine).await), 0);
    }

    #[tokio::test]
    async fn test_persist_then_restore() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).await.unwrap();
        let at = SystemTime::now() + Duration::from_secs(600);

        let engine = StorageEngine::new();
        engine.set("foo", "bar");
        engine.set("baz", "qux quux");
        engine.expire_at("baz", at);

        assert_eq!(assert_ok!(store.persist(&engine).await), 2);

        let restored = StorageEngine::new();
        assert_eq!(assert_ok!(store.restore(&restored).await), 2);
        assert_eq!(restored.get("foo"), Some("bar".to_string()));
        assert_eq!(restored.get("baz"), Some("qux quux".to_string()));
        assert_eq!(restored.dump()["baz"].expires_at, at);
    }

    #[tokio::test]
    async fn test_reopen_keeps_snapshot() {
        let dir = tempfile::tempdir().unwrap();

        let engine = StorageEngine::new();
        engine.set("foo", "bar");
        let store = SnapshotStore::open(dir.path()).await.unwrap();
        store.persist(&engine).await.unwrap();

        let reopened = SnapshotStore::open(dir.path()).await.unwrap();
        let restored = StorageEngine::new();
        assert_eq!(reopened.restore(&restored).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_restore_prefers_live_data() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).await.unwrap();

        let old = StorageEngine::new();
        old.set("shared", "from disk");
        old.set("only_on_disk", "value");
        store.persist(&old).await.unwrap();

        let live = StorageEngine::new();
        live.set("shared", "live");
        assert_eq!(store.restore(&live).await.unwrap(), 1);
        assert_eq!(live.get("shared"), Some("live".to_string()));
        assert_eq!(live.get("only_on_disk"), Some("value".to_string()));
    }

    #[tokio::test]
    async fn test_persist_overwrites_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).await.unwrap();

        let engine = StorageEngine::new();
        engine.set("a", "1");
        engine.set("b", "2");
        store.persist(&engine).await.unwrap();

        engine.delete("b");
        store.persist(&engine).await.unwrap();

        let restored = StorageEngine::new();
        assert_eq!(store.restore(&restored).await.unwrap(), 1);
        assert_eq!(restored.get("b"), None);
    }

    #[tokio::test]
    async fn test_restore_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).await.unwrap();
        std::fs::write(store.path(), b"{\"foo\": {\"value\": ").unwrap();

        let engine = StorageEngine::new();
        let err = assert_err!(store.restore(&engine).await);
        assert!(matches!(err, PersistenceError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_persist_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("gone");
        let store = SnapshotStore::open(&data_dir).await.unwrap();
        std::fs::remove_dir(&data_dir).unwrap();

        let engine = StorageEngine::new();
        let err = assert_err!(store.persist_within(&engine, Duration::from_secs(5)).await);
        assert!(matches!(err, PersistenceError::Write { .. }));
    }

    #[tokio::test]
    async fn test_restore_within_merges_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).await.unwrap();

        let old = StorageEngine::new();
        old.set("foo", "bar");
        store.persist(&old).await.unwrap();

        let engine = StorageEngine::new();
        let restored = assert_ok!(store.restore_within(&engine, Duration::from_secs(5)).await);
        assert_eq!(restored, 1);
        assert_eq!(engine.get("foo"), Some("bar".to_string()));
    }
}
