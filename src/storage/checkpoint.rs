//! Checkpoint storage.
//!
//! Checkpoints are named artifacts whose presence signals that a unit of
//! work is complete. A key is a relative, `/`-separated path such as
//! `research/01_research.json`. An empty artifact counts as absent.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::StoreError;

/// Durable key/value storage for pipeline checkpoints.
///
/// Last write wins per key; no transactional guarantees are required.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// True when `key` holds a non-empty artifact.
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Reads `key`, or `None` when it is absent or empty.
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Replaces the artifact at `key`.
    async fn write(&self, key: &str, data: &[u8]) -> Result<(), StoreError>;

    /// All non-empty keys starting with `prefix`, sorted.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// Reads and deserializes a JSON checkpoint.
pub async fn read_json<T: DeserializeOwned>(
    store: &dyn CheckpointStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match store.read(key).await? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// Like [`read_json`], but a checkpoint that does not deserialize counts as
/// absent so the unit of work that wrote it runs again.
pub async fn read_json_lenient<T: DeserializeOwned>(
    store: &dyn CheckpointStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match read_json(store, key).await {
        Err(StoreError::Json(e)) => {
            warn!(key = %key, error = %e, "Ignoring unreadable checkpoint");
            Ok(None)
        }
        other => other,
    }
}

/// Serializes `value` as pretty JSON and writes it to `key`.
pub async fn write_json<T: Serialize + ?Sized>(
    store: &dyn CheckpointStore,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    store.write(key, &bytes).await
}

/// Reads a UTF-8 text checkpoint.
pub async fn read_text(store: &dyn CheckpointStore, key: &str) -> Result<Option<String>, StoreError> {
    match store.read(key).await? {
        Some(bytes) => String::from_utf8(bytes)
            .map(Some)
            .map_err(|_| StoreError::NotUtf8 { key: key.to_string() }),
        None => Ok(None),
    }
}

/// Writes a UTF-8 text checkpoint.
pub async fn write_text(store: &dyn CheckpointStore, key: &str, text: &str) -> Result<(), StoreError> {
    store.write(key, text.as_bytes()).await
}

/// Validates a checkpoint key and returns its path components.
fn key_components(key: &str) -> Result<Vec<&str>, StoreError> {
    let invalid = || StoreError::InvalidKey(key.to_string());
    if key.is_empty() || key.contains('\\') || key.starts_with('/') {
        return Err(invalid());
    }
    let parts: Vec<&str> = key.split('/').collect();
    if parts.iter().any(|p| p.is_empty() || *p == "." || *p == "..") {
        return Err(invalid());
    }
    Ok(parts)
}

/// Filesystem-backed checkpoint store rooted at a directory.
///
/// Writes go to a temporary sibling file that is renamed into place, so a
/// crash never leaves a truncated checkpoint behind.
#[derive(Debug, Clone)]
pub struct FsCheckpointStore {
    root: PathBuf,
}

impl FsCheckpointStore {
    /// Creates a store rooted at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves `key` to a path below the root.
    pub fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let mut path = self.root.clone();
        for part in key_components(key)? {
            path.push(part);
        }
        Ok(path)
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        Some(parts.join("/"))
    }
}

fn is_temp_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "tmp")
}

#[async_trait]
impl CheckpointStore for FsCheckpointStore {
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let path = self.path_for(key)?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file() && meta.len() > 0),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => Ok(None),
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| StoreError::InvalidKey(key.to_string()))?;
        let temp = path.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()));

        let mut file = fs::File::create(&temp).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);

        if let Err(e) = fs::rename(&temp, &path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }

        debug!(key = %key, bytes = data.len(), "Checkpoint written");
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let meta = entry.metadata().await?;
                if meta.is_dir() {
                    pending.push(path);
                } else if meta.len() > 0 && !is_temp_file(&path) {
                    if let Some(key) = self.key_for(&path) {
                        if key.starts_with(prefix) {
                            keys.push(key);
                        }
                    }
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}

/// In-memory checkpoint store.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored artifacts, empty ones included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// True when nothing has been written.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Removes `key`, returning its previous content.
    pub async fn remove(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.write().await.remove(key)
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        key_components(key)?;
        Ok(self
            .entries
            .read()
            .await
            .get(key)
            .is_some_and(|bytes| !bytes.is_empty()))
    }

    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        key_components(key)?;
        Ok(self
            .entries
            .read()
            .await
            .get(key)
            .filter(|bytes| !bytes.is_empty())
            .cloned())
    }

    async fn write(&self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        key_components(key)?;
        self.entries.write().await.insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .filter(|(key, bytes)| key.starts_with(prefix) && !bytes.is_empty())
            .map(|(key, _)| key.clone())
            .collect())
    }
}
