use crate::error::RegistryError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;

#[derive(Debug, Default, Serialize, Deserialize)]
struct State {
    /// Template name to content id, written only after a successful deploy.
    #[serde(default)]
    templates: HashMap<String, String>,
    /// Template id to its parent's id; empty string denotes a root template.
    #[serde(default)]
    parents: HashMap<String, String>,
    #[serde(default)]
    containers: HashMap<String, HashMap<String, String>>,
}

/// Persistent bookkeeping store for deployed templates. Opened for the
/// duration of a few reads or writes and closed again; `close` persists
/// the state file and propagates write failures.
pub struct Registry {
    path: PathBuf,
    state: State,
    dirty: bool,
}

impl Registry {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref().to_path_buf();

        let state = match fs::read(&path).await {
            Ok(raw) => serde_json::from_slice(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => State::default(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            state,
            dirty: false,
        })
    }

    pub fn add_template(&mut self, name: &str, id: &str) {
        self.state
            .templates
            .insert(name.to_string(), id.to_string());
        self.dirty = true;
    }

    pub fn template_id(&self, name: &str) -> Option<&str> {
        self.state.templates.get(name).map(String::as_str)
    }

    pub fn is_template(&self, name: &str) -> bool {
        self.state.templates.contains_key(name)
    }

    pub fn set_parent(&mut self, id: &str, parent_id: &str) {
        self.state
            .parents
            .insert(id.to_string(), parent_id.to_string());
        self.dirty = true;
    }

    pub fn parent_id(&self, id: &str) -> Option<&str> {
        self.state.parents.get(id).map(String::as_str)
    }

    pub fn add_container(&mut self, name: &str, metadata: HashMap<String, String>) {
        self.state.containers.insert(name.to_string(), metadata);
        self.dirty = true;
    }

    pub fn container(&self, name: &str) -> Option<&HashMap<String, String>> {
        self.state.containers.get(name)
    }

    pub async fn close(self) -> Result<(), RegistryError> {
        if !self.dirty {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let raw = serde_json::to_vec_pretty(&self.state)?;
        fs::write(&self.path, raw).await?;
        tracing::debug!("Registry state persisted to {}", self.path.display());
        Ok(())
    }
}
