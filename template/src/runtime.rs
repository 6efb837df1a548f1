use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use tokio::fs;
use tokio::process::Command;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("{command} failed: {output}")]
    CommandFailed { command: String, output: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Container runtime operations the import pipeline depends on,
/// invoked as an opaque capability.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn is_running(&self, name: &str) -> bool;

    /// Rewrite `key = value` entries in a container's configuration.
    /// Existing entries for the given keys are dropped; entries with an
    /// empty value only clear.
    async fn set_config(&self, id: &str, entries: &[(String, String)]) -> Result<(), RuntimeError>;

    async fn set_uid_map(&self, name: &str) -> Result<(), RuntimeError>;

    async fn map_port(&self, proto: &str, internal: &str, external: u16)
        -> Result<(), RuntimeError>;

    async fn start(&self, name: &str) -> Result<(), RuntimeError>;
}

/// Thin shell-out implementation over the `lxc-*` tools and the
/// container configuration files under the dataset mount prefix.
pub struct LxcRuntime {
    prefix: PathBuf,
}

impl LxcRuntime {
    pub fn new(prefix: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn config_path(&self, id: &str) -> PathBuf {
        self.prefix.join(id).join("config")
    }
}

#[async_trait]
impl ContainerRuntime for LxcRuntime {
    async fn is_running(&self, name: &str) -> bool {
        if name.is_empty() {
            return false;
        }
        match Command::new("lxc-info").args(["-n", name, "-s"]).output().await {
            Ok(output) => {
                output.status.success()
                    && String::from_utf8_lossy(&output.stdout).contains("RUNNING")
            }
            Err(_) => false,
        }
    }

    async fn set_config(&self, id: &str, entries: &[(String, String)]) -> Result<(), RuntimeError> {
        let path = self.config_path(id);
        let current = match fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };

        let keys: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
        let mut lines: Vec<String> = current
            .lines()
            .filter(|line| {
                let key = line.split('=').next().unwrap_or("").trim();
                !keys.contains(&key)
            })
            .map(str::to_string)
            .collect();

        for (key, value) in entries {
            if !value.is_empty() {
                lines.push(format!("{} = {}", key, value));
            }
        }

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await?;
        }
        fs::write(&path, lines.join("\n") + "\n").await?;
        Ok(())
    }

    async fn set_uid_map(&self, name: &str) -> Result<(), RuntimeError> {
        self.set_config(
            name,
            &[
                ("lxc.id_map".to_string(), "u 0 100000 65536".to_string()),
                ("lxc.id_map".to_string(), "g 0 100000 65536".to_string()),
            ],
        )
        .await
    }

    async fn map_port(
        &self,
        proto: &str,
        internal: &str,
        external: u16,
    ) -> Result<(), RuntimeError> {
        let external = external.to_string();
        let args = ["map", proto, "-i", internal, "-e", external.as_str()];
        let output = Command::new("strata").args(args).output().await?;
        if !output.status.success() {
            return Err(RuntimeError::CommandFailed {
                command: format!("strata {}", args.join(" ")),
                output: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    async fn start(&self, name: &str) -> Result<(), RuntimeError> {
        let output = Command::new("lxc-start").args(["-n", name, "-d"]).output().await?;
        if !output.status.success() {
            return Err(RuntimeError::CommandFailed {
                command: format!("lxc-start -n {} -d", name),
                output: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}
