use crate::config::{AgentConfig, MANAGEMENT};
use crate::configure;
use crate::deploy::Deployer;
use crate::error::TemplateError;
use crate::extract::{self, ArchiveExtractor};
use crate::lock::ImportLock;
use crate::runtime::ContainerRuntime;
use crate::trust::Keyring;
use crate::types::Template;
use crate::verify::{self, LocalTrust};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use strata_registry::Registry;
use strata_remote::{RepoClient, RepoError};
use strata_snapshot::SnapshotStore;
use tokio_stream::StreamExt;

#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub name: String,
    pub version: Option<String>,
    pub token: String,
    /// The operator already confirmed an unverifiable local candidate.
    pub accept_unverified: bool,
}

impl ImportRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            token: String::new(),
            accept_unverified: false,
        }
    }
}

#[derive(Debug)]
pub enum ImportOutcome {
    Deployed { name: String, id: String },
    AlreadyPresent { name: String },
    PairingCompleted,
    /// A local candidate could not be verified; the caller decides and
    /// re-enters the import with the acceptance recorded.
    NeedsConfirmation { name: String, file: String },
}

/// Drives one template import end to end: resolve, lock, fetch, verify,
/// extract, recurse into the parent, deploy, persist, configure.
pub struct ImportService {
    config: AgentConfig,
    client: Option<RepoClient>,
    snapshots: Arc<dyn SnapshotStore>,
    keyring: Arc<dyn Keyring>,
    runtime: Arc<dyn ContainerRuntime>,
    extractor: Arc<dyn ArchiveExtractor>,
}

impl ImportService {
    pub fn new(
        config: AgentConfig,
        client: Option<RepoClient>,
        snapshots: Arc<dyn SnapshotStore>,
        keyring: Arc<dyn Keyring>,
        runtime: Arc<dyn ContainerRuntime>,
        extractor: Arc<dyn ArchiveExtractor>,
    ) -> Self {
        Self {
            config,
            client,
            snapshots,
            keyring,
            runtime,
            extractor,
        }
    }

    /// Boxed so parent imports can recurse through the whole pipeline.
    pub fn import<'a>(
        &'a self,
        request: ImportRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ImportOutcome, TemplateError>> + Send + 'a>> {
        Box::pin(self.run(request))
    }

    async fn run(&self, request: ImportRequest) -> Result<ImportOutcome, TemplateError> {
        let mut t = Template::default();

        match &self.client {
            Some(client) => {
                if let Err(e) = client.check().await {
                    tracing::warn!("Repository unreachable, falling back to local cache: {}", e);
                    t.local = true;
                }
            }
            None => t.local = true,
        }

        if request.name == MANAGEMENT
            && request.token.len() > 1
            && self.runtime.is_running(MANAGEMENT).await
        {
            self.keyring
                .exchange_and_encrypt(MANAGEMENT, &request.token)
                .await?;
            return Ok(ImportOutcome::PairingCompleted);
        }

        // TODO: this consults the template name before the selector is
        // parsed, so it can never match a plain import; confirm whether
        // the target container name was intended here.
        if self.runtime.is_running(&t.name).await {
            tracing::info!("{} instance exists", t.name);
            return Ok(ImportOutcome::AlreadyPresent { name: t.name });
        }

        t.parse_selector(&request.name);

        tracing::info!("Importing {}", request.name);
        let _lock = ImportLock::acquire(&self.config.lock_dir, &t.name).await?;

        t.version = request
            .version
            .clone()
            .unwrap_or_else(|| self.config.template_version.clone());
        t.branch = self.config.template_branch.clone();
        tracing::info!("Version: {}, branch: {}", t.version, t.branch);

        // Already deployed: nothing to do, and no repository round trip.
        if !t.name.is_empty() {
            let registry = Registry::open(&self.config.registry_path).await?;
            if let Some(id) = registry.template_id(&t.name)
                && self.snapshots.exists(id).await
            {
                tracing::info!("Template {} ({}) already deployed", t.name, id);
                return Ok(ImportOutcome::AlreadyPresent { name: t.name });
            }
        }

        if !t.local
            && let Some(client) = &self.client
        {
            match client.info(&t.query(), &request.token).await {
                Ok(info) => t.absorb(info),
                Err(e @ RepoError::Ambiguous { .. }) => return Err(e.into()),
                Err(e) => {
                    tracing::warn!("Template lookup failed, falling back to local cache: {}", e);
                    t.local = true;
                }
            }
        }

        let tmp_dir = self.config.tmp_dir();
        tokio::fs::create_dir_all(&tmp_dir).await?;

        if !t.local && t.signatures.is_empty() {
            // Logged and carried on; a missing archive makes the
            // extraction step abort this import instead.
            tracing::error!("Template is not signed");
        } else if !t.local {
            match verify::verify_signature(self.keyring.as_ref(), &t).await {
                Err(e) => tracing::error!("Owner signature verification failed: {}", e),
                Ok(()) => {
                    let staged = tmp_dir.join(&t.id);
                    if let Err(e) = self.download(&t, &request.token, staged.clone()).await {
                        tracing::error!("Template download failed: {}", e);
                    }
                    match verify::verify_integrity(&staged, &t).await {
                        Err(e) => tracing::error!("Integrity verification failed: {}", e),
                        Ok(()) => tracing::info!("File integrity verified"),
                    }
                }
            }
        } else {
            match verify::local_candidate(&tmp_dir, &t).await? {
                LocalTrust::Trusted(file) => {
                    tracing::info!("Local template {} accepted by hash match", file);
                    t.file = file;
                }
                LocalTrust::NeedsConfirmation(file) => {
                    if request.accept_unverified {
                        tracing::warn!("Accepting unverifiable local template {}", file);
                        t.file = file;
                    } else {
                        return Ok(ImportOutcome::NeedsConfirmation { name: t.name, file });
                    }
                }
                LocalTrust::Rejected => {
                    tracing::error!("Cannot find template");
                    return Err(TemplateError::NotFound(request.name.clone()));
                }
            }

            if t.id.is_empty() {
                // Content-derived id for an operator-accepted archive.
                let (md5, _) = verify::file_digests(&tmp_dir.join(&t.file)).await?;
                t.id = md5;
            }
        }

        tracing::info!("Unpacking template {}", t.name);
        let archive = t.archive_name();
        let parent = {
            let registry = Registry::open(&self.config.registry_path).await?;
            extract::extract_template(
                self.extractor.as_ref(),
                &tmp_dir,
                &archive,
                &t.id,
                &t.name,
                &|name| registry.is_template(name),
            )
            .await?
        };

        if let Some(parent) = &parent {
            tracing::info!("Parent template required: {}", parent);
            let recurse = ImportRequest {
                name: parent.clone(),
                version: None,
                token: request.token.clone(),
                accept_unverified: false,
            };
            // A failed parent import is left to surface as this deploy's
            // storage failure.
            if let Err(e) = self.import(recurse).await {
                tracing::error!("Parent import failed for {}: {}", parent, e);
            }
        }

        let parent_id = {
            let registry = Registry::open(&self.config.registry_path).await?;
            parent
                .as_deref()
                .and_then(|p| registry.template_id(p))
                .unwrap_or_default()
                .to_string()
        };

        Deployer::new(self.snapshots.as_ref(), &self.config)
            .deploy(&parent_id, &t.id)
            .await?;

        let mut registry = Registry::open(&self.config.registry_path).await?;
        registry.add_template(&t.name, &t.id);
        let parent_id = parent
            .as_deref()
            .and_then(|p| registry.template_id(p))
            .unwrap_or_default()
            .to_string();
        registry.set_parent(&t.id, &parent_id);
        registry.close().await?;

        tracing::info!("Setting configuration");
        if t.name == MANAGEMENT {
            configure::management_init(
                self.snapshots.as_ref(),
                self.runtime.as_ref(),
                self.keyring.as_ref(),
                &self.config,
                &t.id,
            )
            .await?;
        } else {
            configure::set_default_config(self.runtime.as_ref(), &self.config, &t.id).await?;
        }

        Ok(ImportOutcome::Deployed {
            name: t.name,
            id: t.id,
        })
    }

    async fn download(
        &self,
        t: &Template,
        token: &str,
        dest: PathBuf,
    ) -> Result<(), TemplateError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| TemplateError::Download("no repository client".to_string()))?;

        let mut stream = client.download(&t.query(), token, dest);
        let mut transferred = 0u64;

        while let Some(progress) = stream.next().await {
            if let Some(error) = progress.error {
                return Err(TemplateError::Download(error));
            }
            transferred = progress.current;
            match progress.total {
                Some(total) => tracing::debug!("Transferred {} of {} bytes", progress.current, total),
                None => tracing::debug!("Transferred {} bytes", progress.current),
            }
        }

        tracing::info!("Downloaded {} ({} bytes)", t.name, transferred);
        Ok(())
    }
}
