use crate::error::SnapshotError;
use crate::store::SnapshotStore;
use crate::types::Subvolume;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;

/// Serialized form of a delta stream: the changed file set relative to
/// the parent volume, or the full content when `full` is set.
#[derive(Debug, Serialize, Deserialize)]
struct DeltaStream {
    full: bool,
    files: BTreeMap<String, Vec<u8>>,
    removed: Vec<String>,
}

#[derive(Default)]
struct State {
    datasets: HashMap<String, BTreeMap<String, Vec<u8>>>,
    readonly: HashMap<String, bool>,
    mountpoints: HashMap<String, PathBuf>,
}

/// In-memory snapshot store. Datasets are maps of file name to content;
/// used by tests and development setups without a ZFS pool.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn volume(id: &str, vol: Subvolume) -> String {
        format!("{}/{}", id, vol)
    }

    pub async fn write_file(&self, dataset: &str, name: &str, content: &[u8]) {
        let mut state = self.state.write().await;
        state
            .datasets
            .entry(dataset.to_string())
            .or_default()
            .insert(name.to_string(), content.to_vec());
    }

    pub async fn read_file(&self, dataset: &str, name: &str) -> Option<Vec<u8>> {
        let state = self.state.read().await;
        state.datasets.get(dataset)?.get(name).cloned()
    }

    pub async fn volume_content(&self, id: &str, vol: Subvolume) -> Option<BTreeMap<String, Vec<u8>>> {
        let state = self.state.read().await;
        state.datasets.get(&Self::volume(id, vol)).cloned()
    }

    pub async fn mountpoint(&self, dataset: &str) -> Option<PathBuf> {
        let state = self.state.read().await;
        state.mountpoints.get(dataset).cloned()
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn create(&self, dataset: &str) -> Result<(), SnapshotError> {
        let mut state = self.state.write().await;
        if state.datasets.contains_key(dataset) {
            return Err(SnapshotError::AlreadyExists(dataset.to_string()));
        }
        state.datasets.insert(dataset.to_string(), BTreeMap::new());
        Ok(())
    }

    async fn destroy(&self, dataset: &str) -> Result<(), SnapshotError> {
        let mut state = self.state.write().await;
        if state.datasets.remove(dataset).is_none() {
            return Err(SnapshotError::NotFound(dataset.to_string()));
        }
        let prefix = format!("{}/", dataset);
        state.datasets.retain(|name, _| !name.starts_with(&prefix));
        state.readonly.remove(dataset);
        state.mountpoints.remove(dataset);
        Ok(())
    }

    async fn exists(&self, dataset: &str) -> bool {
        self.state.read().await.datasets.contains_key(dataset)
    }

    async fn is_readonly(&self, dataset: &str) -> Result<bool, SnapshotError> {
        let state = self.state.read().await;
        if !state.datasets.contains_key(dataset) {
            return Err(SnapshotError::NotFound(dataset.to_string()));
        }
        Ok(state.readonly.get(dataset).copied().unwrap_or(false))
    }

    async fn set_readonly(&self, dataset: &str, readonly: bool) -> Result<(), SnapshotError> {
        let mut state = self.state.write().await;
        if !state.datasets.contains_key(dataset) {
            return Err(SnapshotError::NotFound(dataset.to_string()));
        }
        state.readonly.insert(dataset.to_string(), readonly);
        Ok(())
    }

    async fn receive(
        &self,
        parent: &str,
        child: &str,
        vol: Subvolume,
        delta: &Path,
        _incremental: bool,
    ) -> Result<(), SnapshotError> {
        let raw = fs::read(delta).await?;
        let stream: DeltaStream = serde_json::from_slice(&raw)
            .map_err(|e| SnapshotError::InvalidDelta(e.to_string()))?;

        let mut state = self.state.write().await;
        if !state.datasets.contains_key(child) {
            return Err(SnapshotError::NotFound(child.to_string()));
        }

        // Like a real stream, the delta knows whether it is a full send;
        // an incremental stream without its parent volume fails.
        let mut content = if stream.full {
            BTreeMap::new()
        } else {
            state
                .datasets
                .get(&Self::volume(parent, vol))
                .cloned()
                .ok_or_else(|| SnapshotError::NotFound(Self::volume(parent, vol)))?
        };

        for (name, data) in stream.files {
            content.insert(name, data);
        }
        for name in stream.removed {
            content.remove(&name);
        }

        state.datasets.insert(Self::volume(child, vol), content);
        Ok(())
    }

    async fn send(
        &self,
        parent: &str,
        child: &str,
        vol: Subvolume,
        delta: &Path,
        incremental: bool,
    ) -> Result<(), SnapshotError> {
        let state = self.state.read().await;
        let source = state
            .datasets
            .get(&Self::volume(child, vol))
            .ok_or_else(|| SnapshotError::NotFound(Self::volume(child, vol)))?;

        let stream = if incremental {
            let base = state
                .datasets
                .get(&Self::volume(parent, vol))
                .ok_or_else(|| SnapshotError::NotFound(Self::volume(parent, vol)))?;

            let files: BTreeMap<String, Vec<u8>> = source
                .iter()
                .filter(|(name, data)| base.get(*name) != Some(*data))
                .map(|(name, data)| (name.clone(), data.clone()))
                .collect();
            let removed = base
                .keys()
                .filter(|name| !source.contains_key(*name))
                .cloned()
                .collect();

            DeltaStream {
                full: false,
                files,
                removed,
            }
        } else {
            DeltaStream {
                full: true,
                files: source.clone(),
                removed: Vec::new(),
            }
        };

        let raw = serde_json::to_vec(&stream)?;
        if let Some(dir) = delta.parent() {
            fs::create_dir_all(dir).await?;
        }
        fs::write(delta, raw).await?;
        Ok(())
    }

    async fn set_mountpoint(&self, dataset: &str, path: &Path) -> Result<(), SnapshotError> {
        let mut state = self.state.write().await;
        if !state.datasets.contains_key(dataset) {
            return Err(SnapshotError::NotFound(dataset.to_string()));
        }
        state
            .mountpoints
            .insert(dataset.to_string(), path.to_path_buf());
        Ok(())
    }

    async fn copy_file(&self, from: &Path, to: &Path) -> Result<(), SnapshotError> {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(from, to).await?;
        Ok(())
    }
}
