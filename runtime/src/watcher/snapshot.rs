//! Last observed container set per watcher.
//!
//! The file store keeps one JSON document per watcher under a directory and
//! writes it atomically (write tmp, rename) through `tokio::fs`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use shipwatch_core::error::{Result, WatchError};
use shipwatch_core::model::Container;

/// Persistence of the per-host snapshot the watcher diffs against.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Containers observed by the previous cycle, empty when none was saved.
    async fn load_last_snapshot(&self, host_id: &str) -> Result<Vec<Container>>;

    /// Replace the stored snapshot.
    async fn save_snapshot(&self, host_id: &str, containers: &[Container]) -> Result<()>;
}

/// Process-local snapshots, lost on restart.
#[derive(Default)]
pub struct MemorySnapshotStore {
    snapshots: Mutex<HashMap<String, Vec<Container>>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn load_last_snapshot(&self, host_id: &str) -> Result<Vec<Container>> {
        Ok(self
            .snapshots
            .lock()
            .get(host_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_snapshot(&self, host_id: &str, containers: &[Container]) -> Result<()> {
        self.snapshots
            .lock()
            .insert(host_id.to_string(), containers.to_vec());
        Ok(())
    }
}

/// Snapshots stored as `<dir>/<host_id>.json`.
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, host_id: &str) -> PathBuf {
        let file_name: String = host_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", file_name))
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn load_last_snapshot(&self, host_id: &str) -> Result<Vec<Container>> {
        let path = self.path_for(host_id);
        let data = match tokio::fs::read_to_string(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(WatchError::Other(format!(
                    "Failed to read snapshot {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        serde_json::from_str(&data).map_err(|e| {
            WatchError::Serialization(format!("Failed to parse snapshot {}: {}", path.display(), e))
        })
    }

    async fn save_snapshot(&self, host_id: &str, containers: &[Container]) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            WatchError::Other(format!(
                "Failed to create snapshot directory {}: {}",
                self.dir.display(),
                e
            ))
        })?;

        let path = self.path_for(host_id);
        let tmp_path = path.with_extension("tmp");
        let data = serde_json::to_string_pretty(containers)?;
        tokio::fs::write(&tmp_path, &data).await.map_err(|e| {
            WatchError::Other(format!("Failed to write snapshot {}: {}", tmp_path.display(), e))
        })?;
        tokio::fs::rename(&tmp_path, &path).await.map_err(|e| {
            WatchError::Other(format!(
                "Failed to rename snapshot {} -> {}: {}",
                tmp_path.display(),
                path.display(),
                e
            ))
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn container(id: &str) -> Container {
        Container {
            id: id.to_string(),
            name: format!("name-{}", id),
            watcher: "local".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemorySnapshotStore::new();
        assert!(store
            .load_last_snapshot("watcher.docker.local")
            .await
            .unwrap()
            .is_empty());
        store
            .save_snapshot("watcher.docker.local", &[container("a"), container("b")])
            .await
            .unwrap();
        assert_eq!(store.load_last_snapshot("watcher.docker.local").await.unwrap().len(), 2);
        assert!(store.load_last_snapshot("watcher.docker.other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_store_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = FileSnapshotStore::new(dir.path().join("snapshots"));
        assert!(store
            .load_last_snapshot("watcher.docker.local")
            .await
            .unwrap()
            .is_empty());

        store
            .save_snapshot("watcher.docker.local", &[container("a")])
            .await
            .unwrap();
        let loaded = store.load_last_snapshot("watcher.docker.local").await.unwrap();
        assert_eq!(loaded, vec![container("a")]);
        assert!(dir.path().join("snapshots/watcher.docker.local.json").exists());
        assert!(!dir.path().join("snapshots/watcher.docker.local.tmp").exists());
    }

    #[tokio::test]
    async fn test_file_store_replaces_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = FileSnapshotStore::new(dir.path());
        store.save_snapshot("w", &[container("a"), container("b")]).await.unwrap();
        store.save_snapshot("w", &[container("c")]).await.unwrap();
        let loaded = store.load_last_snapshot("w").await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "c");
    }

    #[tokio::test]
    async fn test_file_store_persists_across_instances() {
        let dir = TempDir::new().unwrap();
        FileSnapshotStore::new(dir.path())
            .save_snapshot("w", &[container("a")])
            .await
            .unwrap();
        let reopened = FileSnapshotStore::new(dir.path());
        assert_eq!(reopened.load_last_snapshot("w").await.unwrap()[0].id, "a");
    }

    #[tokio::test]
    async fn test_file_store_sanitizes_names() {
        let dir = TempDir::new().unwrap();
        let store = FileSnapshotStore::new(dir.path());
        store.save_snapshot("../escape/attempt", &[]).await.unwrap();
        assert!(dir.path().join(".._escape_attempt.json").exists());
    }

    #[tokio::test]
    async fn test_corrupt_snapshot() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("w.json"), "not json").unwrap();
        let store = FileSnapshotStore::new(dir.path());
        assert!(matches!(
            store.load_last_snapshot("w").await,
            Err(WatchError::Serialization(_))
        ));
    }
}
