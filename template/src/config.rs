use std::path::PathBuf;

/// The distinguished control-plane template.
pub const MANAGEMENT: &str = "management";
pub const MANAGEMENT_IP: &str = "10.10.10.1";
pub const MANAGEMENT_PORTS: [u16; 3] = [8443, 8444, 8086];

/// Host-level agent settings, threaded explicitly through the import
/// pipeline instead of living in process-wide state.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub repo_url: String,
    /// Mount prefix under which template datasets appear.
    pub prefix: PathBuf,
    /// ZFS pool backing the snapshot store.
    pub pool: String,
    /// Install prefix for shipped LXC include files and helpers.
    pub app_prefix: PathBuf,
    pub lock_dir: PathBuf,
    /// Trust directory holding owner public keys.
    pub keys_dir: PathBuf,
    pub gpg_home: PathBuf,
    pub registry_path: PathBuf,
    pub template_version: String,
    pub template_branch: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            repo_url: "https://cdn.strata-hub.io/rest".to_string(),
            prefix: PathBuf::from("/var/lib/strata"),
            pool: "strata".to_string(),
            app_prefix: PathBuf::from("/usr/lib/strata"),
            lock_dir: PathBuf::from("/var/run/lock"),
            keys_dir: PathBuf::from("/var/lib/strata/keys"),
            gpg_home: PathBuf::from("/var/lib/strata/gnupg"),
            registry_path: PathBuf::from("/var/lib/strata/registry.json"),
            template_version: String::new(),
            template_branch: "stable".to_string(),
        }
    }
}

impl AgentConfig {
    /// Staging area for downloaded archives and extraction directories;
    /// doubles as the local template cache in fallback mode.
    pub fn tmp_dir(&self) -> PathBuf {
        self.prefix.join("tmpdir")
    }

    pub fn template_dir(&self, id: &str) -> PathBuf {
        self.prefix.join(id)
    }
}
