use crate::error::SnapshotError;
use crate::types::Subvolume;
use async_trait::async_trait;
use std::path::Path;

/// Capability surface over the copy-on-write filesystem backing
/// deployed templates. `receive` applies a delta stream produced by the
/// paired `send` of the same implementation.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn create(&self, dataset: &str) -> Result<(), SnapshotError>;

    async fn destroy(&self, dataset: &str) -> Result<(), SnapshotError>;

    async fn exists(&self, dataset: &str) -> bool;

    async fn is_readonly(&self, dataset: &str) -> Result<bool, SnapshotError>;

    async fn set_readonly(&self, dataset: &str, readonly: bool) -> Result<(), SnapshotError>;

    /// Receive a delta stream into `<child>/<vol>`. When `incremental`,
    /// the stream was produced against `<parent>/<vol>`, which must
    /// already be present.
    async fn receive(
        &self,
        parent: &str,
        child: &str,
        vol: Subvolume,
        delta: &Path,
        incremental: bool,
    ) -> Result<(), SnapshotError>;

    /// Produce the delta stream of `<child>/<vol>` relative to
    /// `<parent>/<vol>` (full stream when not `incremental`).
    async fn send(
        &self,
        parent: &str,
        child: &str,
        vol: Subvolume,
        delta: &Path,
        incremental: bool,
    ) -> Result<(), SnapshotError>;

    async fn set_mountpoint(&self, dataset: &str, path: &Path) -> Result<(), SnapshotError>;

    async fn copy_file(&self, from: &Path, to: &Path) -> Result<(), SnapshotError>;
}
