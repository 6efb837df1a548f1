use crate::error::SnapshotError;
use crate::store::SnapshotStore;
use crate::types::Subvolume;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::fs;
use tokio::process::Command;

const BASE_SNAPSHOT: &str = "base";

/// Production snapshot store driving the `zfs` tool. Every template id
/// maps to `<pool>/<id>`, with one nested dataset per sub-volume.
pub struct ZfsStore {
    pool: String,
}

impl ZfsStore {
    pub fn new(pool: impl Into<String>) -> Self {
        Self { pool: pool.into() }
    }

    fn dataset(&self, name: &str) -> String {
        format!("{}/{}", self.pool, name)
    }

    fn volume(&self, id: &str, vol: Subvolume) -> String {
        format!("{}/{}/{}", self.pool, id, vol)
    }

    async fn zfs(&self, args: &[&str]) -> Result<String, SnapshotError> {
        let output = Command::new("zfs").args(args).output().await?;
        if !output.status.success() {
            return Err(SnapshotError::CommandFailed {
                command: format!("zfs {}", args.join(" ")),
                output: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl SnapshotStore for ZfsStore {
    async fn create(&self, dataset: &str) -> Result<(), SnapshotError> {
        let name = self.dataset(dataset);
        tracing::debug!("Creating dataset {}", name);
        self.zfs(&["create", &name]).await?;
        Ok(())
    }

    async fn destroy(&self, dataset: &str) -> Result<(), SnapshotError> {
        let name = self.dataset(dataset);
        tracing::debug!("Destroying dataset {}", name);
        self.zfs(&["destroy", "-r", &name]).await?;
        Ok(())
    }

    async fn exists(&self, dataset: &str) -> bool {
        self.zfs(&["list", "-H", "-o", "name", &self.dataset(dataset)])
            .await
            .is_ok()
    }

    async fn is_readonly(&self, dataset: &str) -> Result<bool, SnapshotError> {
        let out = self
            .zfs(&["get", "-H", "-o", "value", "readonly", &self.dataset(dataset)])
            .await?;
        Ok(out.trim() == "on")
    }

    async fn set_readonly(&self, dataset: &str, readonly: bool) -> Result<(), SnapshotError> {
        let prop = if readonly {
            "readonly=on"
        } else {
            "readonly=off"
        };
        self.zfs(&["set", prop, &self.dataset(dataset)]).await?;
        Ok(())
    }

    async fn receive(
        &self,
        parent: &str,
        child: &str,
        vol: Subvolume,
        delta: &Path,
        incremental: bool,
    ) -> Result<(), SnapshotError> {
        if incremental && !self.exists(parent).await {
            return Err(SnapshotError::NotFound(self.dataset(parent)));
        }

        let target = self.volume(child, vol);
        tracing::debug!("Receiving {} into {}", delta.display(), target);

        let stream = std::fs::File::open(delta)?;
        let output = Command::new("zfs")
            .args(["receive", "-F", &target])
            .stdin(Stdio::from(stream))
            .output()
            .await?;
        if !output.status.success() {
            return Err(SnapshotError::CommandFailed {
                command: format!("zfs receive -F {}", target),
                output: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
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
        let source = format!("{}@{}", self.volume(child, vol), BASE_SNAPSHOT);
        if !self.exists(&format!("{}/{}", child, vol)).await {
            return Err(SnapshotError::NotFound(self.volume(child, vol)));
        }

        // Snapshot may already exist from an earlier send of the same volume.
        let _ = self.zfs(&["snapshot", &source]).await;

        let mut args = vec!["send".to_string()];
        if incremental {
            args.push("-i".to_string());
            args.push(format!("{}@{}", self.volume(parent, vol), BASE_SNAPSHOT));
        }
        args.push(source.clone());

        let out = std::fs::File::create(delta)?;
        let output = Command::new("zfs")
            .args(&args)
            .stdout(Stdio::from(out))
            .output()
            .await?;
        if !output.status.success() {
            return Err(SnapshotError::CommandFailed {
                command: format!("zfs {}", args.join(" ")),
                output: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    async fn set_mountpoint(&self, dataset: &str, path: &Path) -> Result<(), SnapshotError> {
        let prop = format!("mountpoint={}", path.display());
        self.zfs(&["set", &prop, &self.dataset(dataset)]).await?;
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_paths() {
        let store = ZfsStore::new("strata");
        assert_eq!(store.dataset("abc123"), "strata/abc123");
        assert_eq!(store.volume("abc123", Subvolume::Rootfs), "strata/abc123/rootfs");
    }
}
