use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use tokio::fs;
use tokio::process::Command;

#[derive(Error, Debug)]
pub enum TrustError {
    #[error("{command} failed: {output}")]
    CommandFailed { command: String, output: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Key storage and signature primitives behind a narrow surface; the
/// import pipeline never touches key material directly.
#[async_trait]
pub trait Keyring: Send + Sync {
    /// Public keys registered for an owner identity in the trust
    /// directory.
    async fn public_keys(&self, owner: &str) -> Vec<String>;

    /// Open a signature with the given key and return the signed
    /// identity, or nothing when the signature does not verify.
    async fn open_signature(&self, key: &str, signature: &str) -> Option<String>;

    async fn generate_key(&self, name: &str) -> Result<(), TrustError>;

    /// Secure pairing exchange with an already-running management
    /// container.
    async fn exchange_and_encrypt(&self, name: &str, token: &str) -> Result<(), TrustError>;
}

/// Production keyring shelling out to `gpg`. Owner keys live as armored
/// files in the trust directory, named by the owner identity.
pub struct GpgKeyring {
    home: PathBuf,
    keys_dir: PathBuf,
}

impl GpgKeyring {
    pub fn new(home: impl Into<PathBuf>, keys_dir: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            keys_dir: keys_dir.into(),
        }
    }

    fn stage_path(&self, name: &str) -> PathBuf {
        self.home.join("stage").join(name)
    }

    async fn gpg(&self, args: &[&str]) -> Result<String, TrustError> {
        let output = Command::new("gpg")
            .arg("--homedir")
            .arg(&self.home)
            .arg("--batch")
            .args(args)
            .output()
            .await?;
        if !output.status.success() {
            return Err(TrustError::CommandFailed {
                command: format!("gpg {}", args.join(" ")),
                output: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn stage(&self, name: &str, content: &str) -> Result<PathBuf, TrustError> {
        let path = self.stage_path(name);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await?;
        }
        fs::write(&path, content).await?;
        Ok(path)
    }
}

#[async_trait]
impl Keyring for GpgKeyring {
    async fn public_keys(&self, owner: &str) -> Vec<String> {
        let mut keys = Vec::new();
        let mut entries = match fs::read_dir(&self.keys_dir).await {
            Ok(e) => e,
            Err(_) => return keys,
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let file_name = entry.file_name().to_string_lossy().to_string();
            if !file_name.starts_with(owner) {
                continue;
            }
            if let Ok(key) = fs::read_to_string(entry.path()).await {
                keys.push(key);
            }
        }
        keys
    }

    async fn open_signature(&self, key: &str, signature: &str) -> Option<String> {
        let key_path = self.stage("owner.key", key).await.ok()?;
        let sig_path = self.stage("template.sig", signature).await.ok()?;

        let key_arg = key_path.display().to_string();
        self.gpg(&["--import", &key_arg]).await.ok()?;

        let sig_arg = sig_path.display().to_string();
        let opened = self.gpg(&["--decrypt", &sig_arg]).await.ok()?;

        let _ = fs::remove_file(&key_path).await;
        let _ = fs::remove_file(&sig_path).await;

        Some(opened.trim().to_string())
    }

    async fn generate_key(&self, name: &str) -> Result<(), TrustError> {
        let params = format!(
            "Key-Type: RSA\nKey-Length: 2048\nName-Real: {name}\nExpire-Date: 0\n%no-protection\n%commit\n"
        );
        let path = self.stage(&format!("{name}.gen"), &params).await?;
        let path_arg = path.display().to_string();

        tracing::info!("Generating key pair for {}", name);
        self.gpg(&["--gen-key", &path_arg]).await?;
        let _ = fs::remove_file(&path).await;
        Ok(())
    }

    async fn exchange_and_encrypt(&self, name: &str, token: &str) -> Result<(), TrustError> {
        let token_path = self.stage(&format!("{name}.token"), token).await?;
        let token_arg = token_path.display().to_string();

        let out = self.home.join("exchange").join(format!("{name}.token.gpg"));
        if let Some(dir) = out.parent() {
            fs::create_dir_all(dir).await?;
        }
        let out_arg = out.display().to_string();

        tracing::info!("Running pairing token exchange for {}", name);
        self.gpg(&[
            "--trust-model",
            "always",
            "--recipient",
            name,
            "--output",
            &out_arg,
            "--yes",
            "--encrypt",
            &token_arg,
        ])
        .await?;
        let _ = fs::remove_file(&token_path).await;
        Ok(())
    }
}
