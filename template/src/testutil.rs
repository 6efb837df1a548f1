use crate::config::AgentConfig;
use crate::error::TemplateError;
use crate::extract::ArchiveExtractor;
use crate::runtime::{ContainerRuntime, RuntimeError};
use crate::trust::{Keyring, TrustError};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;
use strata_snapshot::{MemoryStore, SnapshotStore, Subvolume};

pub fn test_config(root: &Path) -> AgentConfig {
    AgentConfig {
        repo_url: String::new(),
        prefix: root.join("lxc"),
        pool: "test".to_string(),
        app_prefix: root.join("app"),
        lock_dir: root.join("locks"),
        keys_dir: root.join("keys"),
        gpg_home: root.join("gnupg"),
        registry_path: root.join("registry.json"),
        template_version: "1.0".to_string(),
        template_branch: "stable".to_string(),
    }
}

/// Keyring whose signatures open to the signature string itself, so a
/// signature equal to the template id verifies.
#[derive(Default)]
pub struct EchoKeyring {
    pub generated: Mutex<Vec<String>>,
    pub exchanged: Mutex<Vec<(String, String)>>,
}

impl EchoKeyring {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Keyring for EchoKeyring {
    async fn public_keys(&self, _owner: &str) -> Vec<String> {
        vec!["echo-key".to_string()]
    }

    async fn open_signature(&self, _key: &str, signature: &str) -> Option<String> {
        Some(signature.to_string())
    }

    async fn generate_key(&self, name: &str) -> Result<(), TrustError> {
        self.generated.lock().unwrap().push(name.to_string());
        Ok(())
    }

    async fn exchange_and_encrypt(&self, name: &str, token: &str) -> Result<(), TrustError> {
        self.exchanged
            .lock()
            .unwrap()
            .push((name.to_string(), token.to_string()));
        Ok(())
    }
}

/// Runtime that records every call instead of driving LXC.
#[derive(Default)]
pub struct RecordingRuntime {
    pub running: Mutex<HashSet<String>>,
    pub configs: Mutex<Vec<(String, Vec<(String, String)>)>>,
    pub uid_mapped: Mutex<Vec<String>>,
    pub ports: Mutex<Vec<(String, String, u16)>>,
    pub started: Mutex<Vec<String>>,
}

impl RecordingRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_running(&self, name: &str) {
        self.running.lock().unwrap().insert(name.to_string());
    }

    pub fn config_entries(&self, id: &str) -> Vec<(String, String)> {
        self.configs
            .lock()
            .unwrap()
            .iter()
            .filter(|(target, _)| target == id)
            .flat_map(|(_, entries)| entries.clone())
            .collect()
    }
}

#[async_trait]
impl ContainerRuntime for RecordingRuntime {
    async fn is_running(&self, name: &str) -> bool {
        self.running.lock().unwrap().contains(name)
    }

    async fn set_config(&self, id: &str, entries: &[(String, String)]) -> Result<(), RuntimeError> {
        self.configs
            .lock()
            .unwrap()
            .push((id.to_string(), entries.to_vec()));
        Ok(())
    }

    async fn set_uid_map(&self, name: &str) -> Result<(), RuntimeError> {
        self.uid_mapped.lock().unwrap().push(name.to_string());
        Ok(())
    }

    async fn map_port(
        &self,
        proto: &str,
        internal: &str,
        external: u16,
    ) -> Result<(), RuntimeError> {
        self.ports
            .lock()
            .unwrap()
            .push((proto.to_string(), internal.to_string(), external));
        Ok(())
    }

    async fn start(&self, name: &str) -> Result<(), RuntimeError> {
        self.started.lock().unwrap().push(name.to_string());
        Ok(())
    }
}

/// Extractor that ignores the archive and writes fixed files into the
/// destination.
pub struct DirExtractor {
    files: Vec<(String, String)>,
}

impl DirExtractor {
    pub fn new(files: &[(&str, &str)]) -> Self {
        Self {
            files: files
                .iter()
                .map(|(name, content)| (name.to_string(), content.to_string()))
                .collect(),
        }
    }
}

#[async_trait]
impl ArchiveExtractor for DirExtractor {
    async fn extract(&self, _archive: &Path, dest: &Path) -> Result<(), TemplateError> {
        for (name, content) in &self.files {
            let path = dest.join(name);
            if let Some(dir) = path.parent() {
                tokio::fs::create_dir_all(dir).await?;
            }
            tokio::fs::write(&path, content).await?;
        }
        Ok(())
    }
}

/// Gzip-compressed tar archive built in memory.
pub fn pack_archive(files: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for (name, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, data.as_slice()).unwrap();
    }

    builder.into_inner().unwrap().finish().unwrap()
}

/// Populate the staging directory for one template the way extraction
/// would have: metadata files plus delta streams produced against the
/// given parent.
pub async fn stage_template(
    store: &MemoryStore,
    config: &AgentConfig,
    id: &str,
    parent_id: &str,
    rootfs: &[(&str, &[u8])],
) {
    let scratch = format!("src-{}", id);
    store.create(&scratch).await.unwrap();
    for vol in Subvolume::ALL {
        store.create(&format!("{}/{}", scratch, vol)).await.unwrap();
    }
    for (name, data) in rootfs {
        store
            .write_file(&format!("{}/rootfs", scratch), name, data)
            .await;
    }

    let staging = config.tmp_dir().join(format!("{}.dir", id));
    let deltas = staging.join("deltas");
    tokio::fs::create_dir_all(&deltas).await.unwrap();

    let incremental = !parent_id.is_empty();
    for vol in Subvolume::ALL {
        store
            .send(parent_id, &scratch, vol, &deltas.join(vol.delta_file()), incremental)
            .await
            .unwrap();
    }

    for (file, content) in [
        ("config", format!("lxc.utsname = {}\n", id)),
        ("fstab", "proc /proc proc defaults 0 0\n".to_string()),
        ("packages", "base-files\n".to_string()),
    ] {
        tokio::fs::write(staging.join(file), content).await.unwrap();
    }
}

/// Build a complete template archive: metadata files plus the four
/// delta streams of `scratch` (seeded here with `rootfs`), diffed
/// against `diff_against` when given.
pub async fn template_archive(
    store: &MemoryStore,
    scratch: &str,
    diff_against: Option<&str>,
    parent_decl: Option<&str>,
    rootfs: &[(&str, &[u8])],
    work: &Path,
) -> Vec<u8> {
    store.create(scratch).await.unwrap();
    for vol in Subvolume::ALL {
        store.create(&format!("{}/{}", scratch, vol)).await.unwrap();
    }
    for (name, data) in rootfs {
        store
            .write_file(&format!("{}/rootfs", scratch), name, data)
            .await;
    }

    tokio::fs::create_dir_all(work).await.unwrap();
    let mut files: Vec<(String, Vec<u8>)> = Vec::new();

    let config = match parent_decl {
        Some(parent) => format!("subutai.parent = {}\n", parent),
        None => "# no parent\n".to_string(),
    };
    files.push(("config".to_string(), config.into_bytes()));
    files.push(("fstab".to_string(), b"proc /proc proc defaults 0 0\n".to_vec()));
    files.push(("packages".to_string(), b"base-files\n".to_vec()));

    for vol in Subvolume::ALL {
        let delta = work.join(format!("{}-{}", scratch, vol.delta_file()));
        store
            .send(
                diff_against.unwrap_or(""),
                scratch,
                vol,
                &delta,
                diff_against.is_some(),
            )
            .await
            .unwrap();
        files.push((
            format!("deltas/{}", vol.delta_file()),
            tokio::fs::read(&delta).await.unwrap(),
        ));
    }

    let refs: Vec<(&str, Vec<u8>)> = files
        .iter()
        .map(|(name, data)| (name.as_str(), data.clone()))
        .collect();
    pack_archive(&refs)
}
