use crate::config::AgentConfig;
use crate::error::TemplateError;
use std::path::Path;
use strata_snapshot::{SnapshotStore, Subvolume};

const METADATA_FILES: [&str; 3] = ["config", "fstab", "packages"];

/// Materializes an unpacked template as a layered dataset on top of its
/// parent's.
pub struct Deployer<'a> {
    snapshots: &'a dyn SnapshotStore,
    config: &'a AgentConfig,
}

impl<'a> Deployer<'a> {
    pub fn new(snapshots: &'a dyn SnapshotStore, config: &'a AgentConfig) -> Self {
        Self { snapshots, config }
    }

    /// Create the child dataset and receive every sub-volume delta. The
    /// extraction directory is removed afterwards whether or not the
    /// install succeeded; the registry record is the caller's to write,
    /// and only after success.
    pub async fn deploy(&self, parent_id: &str, child_id: &str) -> Result<(), TemplateError> {
        let staging = self.config.tmp_dir().join(format!("{}.dir", child_id));
        let result = self.install(parent_id, child_id, &staging).await;

        if let Err(e) = tokio::fs::remove_dir_all(&staging).await {
            tracing::warn!("Failed to remove extraction directory {}: {}", staging.display(), e);
        }

        result
    }

    async fn install(
        &self,
        parent_id: &str,
        child_id: &str,
        staging: &Path,
    ) -> Result<(), TemplateError> {
        tracing::info!("Installing template {}", child_id);
        self.snapshots.create(child_id).await?;

        // A root template's streams are full rather than deltas against
        // a parent.
        let incremental = !parent_id.is_empty() && parent_id != child_id;

        for vol in Subvolume::ALL {
            let delta = staging.join("deltas").join(vol.delta_file());
            self.snapshots
                .receive(parent_id, child_id, vol, &delta, incremental)
                .await?;
        }

        for file in METADATA_FILES {
            let target = self.config.template_dir(child_id).join(file);
            self.snapshots
                .copy_file(&staging.join(file), &target)
                .await?;
        }

        Ok(())
    }
}
